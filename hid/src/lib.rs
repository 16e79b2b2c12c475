//! HID report descriptors and report encoders for BLE HID peripherals.
//!
//! Every encoder in this crate produces the report value prefixed by its
//! report ID, matching the report state buffers kept by the device-class
//! services in `blehid`.

#![no_std]
#![warn(missing_debug_implementations)]
#![warn(unused_crate_dependencies)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]

extern crate alloc;

pub mod consumer;
pub mod descriptor;
pub mod kbd;
pub mod mouse;
pub mod usage;

/// Report type as used by the Report Reference descriptor
/// (\[HIDS\] Section 3.6.2).
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum ReportType {
    Input = 1,
    Output = 2,
    Feature = 3,
}

/// Report reference identifying one report of a device class.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ReportRef {
    pub id: u8,
    pub typ: ReportType,
}

impl ReportRef {
    /// Creates an input report reference.
    #[inline(always)]
    #[must_use]
    pub const fn input(id: u8) -> Self {
        Self {
            id,
            typ: ReportType::Input,
        }
    }

    /// Creates an output report reference.
    #[inline(always)]
    #[must_use]
    pub const fn output(id: u8) -> Self {
        Self {
            id,
            typ: ReportType::Output,
        }
    }

    /// Returns the Report Reference descriptor value.
    #[inline(always)]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.id, self.typ as u8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_ref() {
        assert_eq!(ReportRef::input(1).to_bytes(), [1, 1]);
        assert_eq!(ReportRef::output(2).to_bytes(), [2, 2]);
        assert_eq!(ReportType::try_from(3).ok(), Some(ReportType::Feature));
        assert!(ReportType::try_from(0).is_err());
    }
}
