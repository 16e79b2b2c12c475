use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;

/// Bluetooth Base UUID ([Vol 3] Part B, Section 2.5.1).
const BASE: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

/// 16-bit Bluetooth SIG UUID.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid16(NonZeroU16);

impl Uuid16 {
    /// UUID size in bytes.
    pub const BYTES: usize = 2;

    /// Creates a 16-bit SIG UUID from a `u16`.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Option<Self> {
        match NonZeroU16::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the full 128-bit UUID value.
    #[inline]
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        (self.0.get() as u128) << 96 | BASE
    }

    /// Returns the UUID as a little-endian byte array.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; Self::BYTES] {
        self.0.get().to_le_bytes()
    }
}

impl Debug for Uuid16 {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0.get())
    }
}

impl Display for Uuid16 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let u = self.0.get();
        if let Ok(v) = Service::try_from(u) {
            Debug::fmt(&v, f)
        } else if let Ok(v) = Characteristic::try_from(u) {
            Debug::fmt(&v, f)
        } else if let Ok(v) = Descriptor::try_from(u) {
            Debug::fmt(&v, f)
        } else {
            Debug::fmt(self, f)
        }
    }
}

impl From<Uuid16> for u16 {
    #[inline]
    fn from(u: Uuid16) -> Self {
        u.0.get()
    }
}

/// Implements conversion from an assigned number enum into [`Uuid16`].
macro_rules! uuid16_enum {
    ($($t:ty),+) => {$(
        impl From<$t> for Uuid16 {
            #[inline]
            fn from(v: $t) -> Self {
                // SAFETY: Assigned numbers are non-zero
                Self(unsafe { NonZeroU16::new_unchecked(v as u16) })
            }
        }

        impl PartialEq<$t> for Uuid16 {
            #[inline]
            fn eq(&self, other: &$t) -> bool {
                self.0.get() == *other as u16
            }
        }
    )+};
}

uuid16_enum!(Service, Characteristic, Descriptor);

/// GATT service UUIDs ([Assigned Numbers] Section 3.4).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum Service {
    DeviceInformation = 0x180A,
    Battery = 0x180F,
    HumanInterfaceDevice = 0x1812,
}

/// GATT characteristic UUIDs ([Assigned Numbers] Section 3.8).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum Characteristic {
    BatteryLevel = 0x2A19,
    ModelNumberString = 0x2A24,
    ManufacturerNameString = 0x2A29,
    HidInformation = 0x2A4A,
    ReportMap = 0x2A4B,
    HidControlPoint = 0x2A4C,
    Report = 0x2A4D,
    PnpId = 0x2A50,
}

/// GATT descriptor UUIDs ([Assigned Numbers] Section 3.7).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum Descriptor {
    ClientCharacteristicConfiguration = 0x2902,
    ReportReference = 0x2908,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid16() {
        let u = Uuid16::from(Service::HumanInterfaceDevice);
        assert_eq!(u16::from(u), 0x1812);
        assert_eq!(u.to_bytes(), [0x12, 0x18]);
        assert_eq!(u.as_u128(), 0x00001812_0000_1000_8000_00805F9B34FB);
        assert_eq!(u.to_string(), "HumanInterfaceDevice");
        assert_eq!(format!("{u:?}"), "0x1812");
        assert_eq!(Uuid16::new(0x1234).unwrap().to_string(), "0x1234");
        assert_eq!(Uuid16::from(Descriptor::ReportReference), Descriptor::ReportReference);
        assert!(Uuid16::new(0).is_none());
    }
}
