//! Implementation of length-type-value response data format used in the
//! Advertising Data (AD) and Scan Response Data (SRD) blocks:
//!
//! * [Vol 3] Part C, Section 11
//! * [Core Specification Supplement] Part A, Section 1
//! * [Assigned Numbers] Section 2.3

use structbuf::{Pack, StructBuf};

use crate::gap::{AdvFlag, Appearance, ResponseDataType, Uuid16};
use crate::le::TxPower;

/// Maximum size of legacy advertising and scan response data
/// ([Vol 6] Part B, Section 2.3.1).
pub const LEGACY_MAX: usize = 31;

/// Error returned when a field does not fit in the remaining space.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("response data overflow: {need} bytes needed, {have} available")]
pub struct Overflow {
    pub need: usize,
    pub have: usize,
}

/// Response data builder.
#[derive(Clone, Debug)]
pub struct ResponseDataMut(StructBuf);

impl ResponseDataMut {
    /// Creates a new legacy (31-byte) response data buffer.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(StructBuf::new(LEGACY_MAX))
    }

    /// Returns the final response data buffer.
    #[allow(clippy::missing_const_for_fn)]
    #[inline]
    pub fn get(self) -> StructBuf {
        self.0
    }

    /// Returns the number of bytes that can still be appended, including the
    /// two-byte field header.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.0.lim() - self.0.len()
    }

    /// Appends a list of 16-bit service class UUIDs (\[CSS\] Part A,
    /// Section 1.1). An empty incomplete list is omitted.
    pub fn service_class(
        &mut self,
        complete: bool,
        uuids: &[Uuid16],
    ) -> Result<&mut Self, Overflow> {
        if !complete && uuids.is_empty() {
            return Ok(self);
        }
        let typ = if complete {
            ResponseDataType::ServiceClass16
        } else {
            ResponseDataType::IncompleteServiceClass16
        };
        let v: Vec<u8> = uuids.iter().flat_map(|u| u.to_bytes()).collect();
        self.put(typ, &v)
    }

    /// Appends either shortened or complete local device name
    /// (\[CSS\] Part A, Section 1.2).
    pub fn local_name(
        &mut self,
        complete: bool,
        v: impl AsRef<str>,
    ) -> Result<&mut Self, Overflow> {
        let typ = if complete {
            ResponseDataType::CompleteLocalName
        } else {
            ResponseDataType::ShortLocalName
        };
        self.put(typ, v.as_ref().as_bytes())
    }

    /// Appends the local name, shortening it at a character boundary if the
    /// complete name does not fit. Returns the number of name bytes written.
    pub fn fit_local_name(&mut self, v: &str) -> Result<usize, Overflow> {
        let have = self.remaining().saturating_sub(2);
        if v.len() <= have {
            self.local_name(true, v)?;
            return Ok(v.len());
        }
        let n = (0..=have).rev().find(|&i| v.is_char_boundary(i)).unwrap_or(0);
        if n == 0 {
            return Err(Overflow {
                need: 3,
                have: self.remaining(),
            });
        }
        self.local_name(false, &v[..n])?;
        Ok(n)
    }

    /// Appends advertising flags (\[CSS\] Part A, Section 1.3).
    pub fn flags(&mut self, v: AdvFlag) -> Result<&mut Self, Overflow> {
        self.put(ResponseDataType::Flags, &[v.bits()])
    }

    /// Appends manufacturer-specific data (\[CSS\] Part A, Section 1.4).
    pub fn manufacturer_data(&mut self, company_id: u16, v: &[u8]) -> Result<&mut Self, Overflow> {
        let mut b = Vec::with_capacity(2 + v.len());
        b.extend_from_slice(&company_id.to_le_bytes());
        b.extend_from_slice(v);
        self.put(ResponseDataType::ManufacturerData, &b)
    }

    /// Appends TX power level (\[CSS\] Part A, Section 1.5).
    pub fn tx_power(&mut self, v: TxPower) -> Result<&mut Self, Overflow> {
        self.put(ResponseDataType::TxPower, &i8::from(v).to_le_bytes())
    }

    /// Appends device appearance (\[CSS\] Part A, Section 1.12).
    pub fn appearance(&mut self, v: Appearance) -> Result<&mut Self, Overflow> {
        self.put(ResponseDataType::Appearance, &(v as u16).to_le_bytes())
    }

    /// Appends a length-type-data field to the buffer.
    fn put(&mut self, typ: ResponseDataType, v: &[u8]) -> Result<&mut Self, Overflow> {
        let (need, have) = (2 + v.len(), self.remaining());
        let n = (u8::try_from(1 + v.len()).ok())
            .filter(|_| need <= have)
            .ok_or(Overflow { need, have })?;
        self.0.append().put([n, typ.into()]).put(v);
        Ok(self)
    }
}

impl Default for ResponseDataMut {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::gap::Service;

    use super::*;

    #[test]
    fn css_example_2_1_2() {
        let mut ad = ResponseDataMut::new();
        ad.flags(AdvFlag::LE_LIMITED)
            .unwrap()
            .local_name(true, "Pedometer")
            .unwrap();
        let want = &[
            0x02, // Length of this Data
            0x01, // <Flags>
            0x01, // LE Limited Discoverable Flag set
            0x0A, // Length of this Data
            0x09, // <Complete local name>
            0x50, // 'P'
            0x65, // 'e'
            0x64, // 'd'
            0x6F, // 'o'
            0x6D, // 'm'
            0x65, // 'e'
            0x74, // 't'
            0x65, // 'e'
            0x72, // 'r'
        ];
        assert_eq!(ad.get().as_ref(), want);
    }

    #[test]
    fn hid_ad() {
        let mut ad = ResponseDataMut::new();
        ad.flags(AdvFlag::LE_GENERAL | AdvFlag::NO_BREDR)
            .and_then(|ad| ad.service_class(true, &[Service::HumanInterfaceDevice.into()]))
            .and_then(|ad| ad.appearance(Appearance::Keyboard))
            .and_then(|ad| ad.manufacturer_data(0x00E0, &[0x01]))
            .unwrap();
        assert_eq!(
            ad.get().as_ref(),
            &[
                0x02, 0x01, 0x06, // Flags
                0x03, 0x03, 0x12, 0x18, // HID service
                0x03, 0x19, 0xC1, 0x03, // Appearance
                0x04, 0xFF, 0xE0, 0x00, 0x01, // Manufacturer data
            ]
        );
    }

    #[test]
    fn overflow() {
        let mut sr = ResponseDataMut::new();
        assert_eq!(
            sr.manufacturer_data(0x00E0, &[0; 28]).unwrap_err(),
            Overflow { need: 32, have: 31 }
        );
        sr.manufacturer_data(0x00E0, &[0; 27]).unwrap();
        assert_eq!(sr.remaining(), 0);
        assert_eq!(sr.get().len(), LEGACY_MAX);
    }

    #[test]
    fn fit_name() {
        let mut sr = ResponseDataMut::new();
        assert_eq!(sr.fit_local_name("Keyboard").unwrap(), 8);
        assert_eq!(sr.get().as_ref()[1], 0x09);

        let mut sr = ResponseDataMut::new();
        sr.service_class(false, &[Service::Battery.into()]).unwrap();
        let long = "A very long device name that cannot fit";
        assert_eq!(sr.fit_local_name(long).unwrap(), 25);
        let v = sr.get();
        assert_eq!(v.len(), LEGACY_MAX);
        assert_eq!(v.as_ref()[5], 0x08);

        let mut sr = ResponseDataMut::new();
        sr.manufacturer_data(0, &[0; 26]).unwrap();
        assert!(sr.fit_local_name("é").is_err());
    }
}
