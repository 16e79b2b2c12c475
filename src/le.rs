//! LE-specific types.

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Bluetooth device address ([Vol 6] Part B, Section 1.3).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Addr {
    Public(RawAddr),
    Random(RawAddr),
}

impl Addr {
    /// Returns the raw 48-bit address.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> RawAddr {
        match self {
            Self::Public(addr) | Self::Random(addr) => addr,
        }
    }
}

impl Default for Addr {
    #[inline]
    fn default() -> Self {
        Self::Public(RawAddr::default())
    }
}

impl Display for Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Public(ref raw) => write!(f, "{raw}"),
            Self::Random(ref raw) => write!(f, "{raw} (random)"),
        }
    }
}

/// 48-bit untyped device address stored in little-endian byte order.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct RawAddr([u8; 6]);

impl RawAddr {
    /// Creates an address from little-endian bytes.
    #[inline(always)]
    #[must_use]
    pub const fn from_le_bytes(v: [u8; 6]) -> Self {
        Self(v)
    }

    /// Returns the address as little-endian bytes.
    #[inline(always)]
    #[must_use]
    pub const fn as_le_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Debug for RawAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // [Vol 3] Part C, Section 3.2.1.3
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

impl Display for RawAddr {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Error returned when parsing an address string.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid device address")]
pub struct ParseAddrError;

impl FromStr for RawAddr {
    type Err = ParseAddrError;

    /// Parses the `XX:XX:XX:XX:XX:XX` format used by platform APIs, most
    /// significant byte first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut v = [0; 6];
        let mut it = s.split(':');
        for b in v.iter_mut().rev() {
            let p = it.next().ok_or(ParseAddrError)?;
            if p.len() != 2 {
                return Err(ParseAddrError);
            }
            *b = u8::from_str_radix(p, 16).map_err(|_| ParseAddrError)?;
        }
        if it.next().is_some() {
            return Err(ParseAddrError);
        }
        Ok(Self(v))
    }
}

/// Remote device identity.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Peer {
    pub addr: Addr,
    pub name: Option<String>,
}

impl Peer {
    /// Creates a peer without a known name.
    #[inline]
    #[must_use]
    pub const fn new(addr: Addr) -> Self {
        Self { addr, name: None }
    }

    /// Sets the peer's name.
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Display for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.name {
            Some(ref name) => write!(f, "{name} [{}]", self.addr),
            None => Display::fmt(&self.addr, f),
        }
    }
}

/// Transmission power level in dBm.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct TxPower(i8);

impl TxPower {
    /// Maximum power level ([Vol 6] Part A, Section 3).
    pub(crate) const MAX: i8 = 20;

    /// Creates a power level of `v` dBm, clamped to the maximum.
    #[inline]
    #[must_use]
    pub const fn new(v: i8) -> Self {
        Self(if v > Self::MAX { Self::MAX } else { v })
    }
}

impl Default for TxPower {
    /// Returns the "medium" level used by most platform advertisers.
    #[inline]
    fn default() -> Self {
        Self(-7)
    }
}

impl From<TxPower> for i8 {
    #[inline]
    fn from(p: TxPower) -> Self {
        p.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_addr() {
        let a: RawAddr = "00:11:22:33:44:5F".parse().unwrap();
        assert_eq!(a.as_le_bytes(), &[0x5F, 0x44, 0x33, 0x22, 0x11, 0x00]);
        assert_eq!(a.to_string(), "00:11:22:33:44:5F");
        assert_eq!(Addr::Random(a).to_string(), "00:11:22:33:44:5F (random)");
        for s in ["", "00:11:22:33:44", "00:11:22:33:44:55:66", "0:11:22:33:44:55"] {
            assert_eq!(s.parse::<RawAddr>(), Err(ParseAddrError), "{s:?}");
        }
    }

    #[test]
    fn peer() {
        let p = Peer::new(Addr::Public(RawAddr::from_le_bytes([1, 0, 0, 0, 0, 0])));
        assert_eq!(p.to_string(), "00:00:00:00:00:01");
        assert_eq!(p.with_name("Mac").to_string(), "Mac [00:00:00:00:00:01]");
    }

    #[test]
    fn tx_power() {
        assert_eq!(i8::from(TxPower::new(127)), TxPower::MAX);
        assert_eq!(i8::from(TxPower::new(-21)), -21);
    }
}
