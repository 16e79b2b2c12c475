use std::fmt::{Display, Formatter};

bitflags::bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        /// Permits broadcasts of the Characteristic Value.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permits writes of the Characteristic Value without response.
        const WRITE_CMD = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment. The Client Characteristic Configuration Descriptor
        /// shall exist.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        const INDICATE = 0x20;
    }
}

bitflags::bitflags! {
    /// Attribute access permissions. Bit values match the platform GATT
    /// permission constants.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Perms: u16 {
        const READ = 0x01;
        const READ_ENCRYPTED = 0x02;
        const WRITE = 0x10;
        const WRITE_ENCRYPTED = 0x20;
    }
}

impl Perms {
    /// Read-only access, requiring an encrypted link if `encrypt` is set.
    #[inline]
    #[must_use]
    pub const fn ro(encrypt: bool) -> Self {
        if encrypt {
            Self::READ_ENCRYPTED
        } else {
            Self::READ
        }
    }

    /// Write-only access, requiring an encrypted link if `encrypt` is set.
    #[inline]
    #[must_use]
    pub const fn wo(encrypt: bool) -> Self {
        if encrypt {
            Self::WRITE_ENCRYPTED
        } else {
            Self::WRITE
        }
    }

    /// Read-write access, requiring an encrypted link if `encrypt` is set.
    #[inline]
    #[must_use]
    pub const fn rw(encrypt: bool) -> Self {
        Self::ro(encrypt).union(Self::wo(encrypt))
    }
}

/// Client Characteristic Configuration descriptor values
/// ([Vol 3] Part G, Section 3.3.3.3).
pub mod cccd {
    /// Notifications and indications disabled.
    pub const DISABLE: [u8; 2] = [0x00, 0x00];
    /// Notifications enabled.
    pub const NOTIFY: [u8; 2] = [0x01, 0x00];
    /// Indications enabled.
    pub const INDICATE: [u8; 2] = [0x02, 0x00];
}

/// ATT error codes returned in read and write responses
/// ([Vol 3] Part F, Section 3.4.1.1 and [Vol 3] Part G, Section 4.12.3).
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ErrorCode {
    InvalidHandle = 0x01,
    ReadNotPermitted = 0x02,
    WriteNotPermitted = 0x03,
    RequestNotSupported = 0x06,
    InvalidOffset = 0x07,
    InvalidAttributeValueLength = 0x0D,
    UnlikelyError = 0x0E,
    ValueNotAllowed = 0x13,
    CccdImproperlyConfigured = 0xFD,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?} ({:#04X})", u8::from(*self))
    }
}

impl std::error::Error for ErrorCode {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perms() {
        assert_eq!(Perms::rw(false), Perms::READ | Perms::WRITE);
        assert_eq!(
            Perms::rw(true),
            Perms::READ_ENCRYPTED | Perms::WRITE_ENCRYPTED
        );
        assert_eq!(ErrorCode::InvalidOffset.to_string(), "InvalidOffset (0x07)");
    }
}
