//! Generic Access Profile ([Vol 3] Part C).

pub use {response_data::*, uuid::*};

mod response_data;
mod uuid;

bitflags::bitflags! {
    /// Advertising data flags (\[CSS\] Part A, Section 1.3).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct AdvFlag: u8 {
        /// LE Limited Discoverable Mode.
        const LE_LIMITED = 1 << 0;
        /// LE General Discoverable Mode.
        const LE_GENERAL = 1 << 1;
        /// BR/EDR Not Supported.
        const NO_BREDR = 1 << 2;
    }
}

/// External appearance of the device ([Assigned Numbers] Section 2.6.3).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[non_exhaustive]
#[repr(u16)]
pub enum Appearance {
    #[default]
    GenericHid = 0x03C0,
    Keyboard = 0x03C1,
    Mouse = 0x03C2,
}

/// Response data types ([Assigned Numbers] Section 2.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum ResponseDataType {
    Flags = 0x01,
    IncompleteServiceClass16 = 0x02,
    ServiceClass16 = 0x03,
    ShortLocalName = 0x08,
    CompleteLocalName = 0x09,
    TxPower = 0x0A,
    Appearance = 0x19,
    ManufacturerData = 0xFF,
}
