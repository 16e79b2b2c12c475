//! Bluetooth LE HID-over-GATT peripheral core.
//!
//! Turns a device with a BLE peripheral radio into a wireless mouse, keyboard,
//! and media controller. The platform GATT server, advertiser, and bond store
//! are reached through the [`host::Platform`] trait. Everything above it (the
//! HID service tree, report encoding, notification flow control, advertising
//! payloads, and pairing state) lives in this crate and is driven by
//! [`BleHidManager`].

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_crate_dependencies)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(variant_size_differences)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]

use std::fmt::{Display, Formatter};

pub use blehid_hid as hid;
pub use manager::*;

pub mod adv;
pub mod compat;
pub mod config;
pub mod gap;
pub mod gatt;
pub mod host;
pub mod le;
mod manager;
pub mod profile;
pub mod smp;

/// Mutex used for short synchronous critical sections.
type SyncMutex<T> = parking_lot::Mutex<T>;

/// Common result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type returned by the public API.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no connected device")]
    NoConnection,
    #[error("notifications are not enabled for {0}")]
    NotReady(gatt::Handle),
    #[error("{what} {value} is outside [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("pairing with {0} is in progress")]
    PairingInProgress(le::Addr),
    #[error("advertising failed: {0}")]
    Advertising(#[from] adv::AdvError),
    #[error("GATT {op} failed: {reason}")]
    Gatt { op: gatt::GattOp, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("{0} device class is not enabled")]
    ClassDisabled(profile::hid::Class),
}

impl Error {
    /// Returns an [`Error::OutOfRange`] error if `v` is not in `[min, max]`.
    #[inline]
    pub(crate) fn check_range(what: &'static str, v: i64, min: i64, max: i64) -> Result<()> {
        if (min..=max).contains(&v) {
            Ok(())
        } else {
            Err(Self::OutOfRange {
                what,
                value: v,
                min,
                max,
            })
        }
    }

    /// Returns whether the error was caused by a missing connection or
    /// disabled notifications.
    #[inline]
    #[must_use]
    pub const fn is_not_ready(&self) -> bool {
        matches!(*self, Self::NoConnection | Self::NotReady(_))
    }
}

/// Lowercase hex formatter for log messages.
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
pub(crate) struct Hex<'a>(pub &'a [u8]);

impl Display for Hex<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
