//! HID over GATT Profile ([HOGP]) device role.
//!
//! [`HidService`] defines the Human Interface Device service and owns the
//! device-class services. Each class keeps its current report in a
//! [`ReportCell`] shared with the Input Report characteristic, encodes
//! application input with the `blehid-hid` encoders, and sends reports
//! through the [`Notifier`](crate::gatt::Notifier).
//!
//! [HOGP]: https://www.bluetooth.com/specifications/specs/hid-over-gatt-profile-1-0/

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

pub use {kbd::*, media::*, mouse::*, service::*};

use crate::gatt::{ErrorCode, Io, IoReq};
use crate::SyncMutex;

mod kbd;
mod media;
mod mouse;
mod service;

/// HID device class.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Class {
    Mouse,
    Keyboard,
    Media,
}

impl Display for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match *self {
            Self::Mouse => "mouse",
            Self::Keyboard => "keyboard",
            Self::Media => "media",
        })
    }
}

bitflags::bitflags! {
    /// Connection and readiness state observed by the application.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct HidState: u8 {
        /// A central is connected.
        const CONNECTED = 1 << 0;
        /// The host suspended the device through the HID Control Point.
        const SUSPENDED = 1 << 1;
        /// Mouse input reports can be sent.
        const MOUSE_READY = 1 << 2;
        /// Keyboard input reports can be sent.
        const KBD_READY = 1 << 3;
        /// Consumer control input reports can be sent.
        const MEDIA_READY = 1 << 4;
    }
}

impl HidState {
    /// Returns the readiness flag of `c`.
    #[inline]
    #[must_use]
    pub const fn ready_flag(c: Class) -> Self {
        match c {
            Class::Mouse => Self::MOUSE_READY,
            Class::Keyboard => Self::KBD_READY,
            Class::Media => Self::MEDIA_READY,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        self.contains(Self::CONNECTED)
    }

    #[inline]
    #[must_use]
    pub const fn is_suspended(self) -> bool {
        self.contains(Self::SUSPENDED)
    }

    /// Returns whether input reports of class `c` can be sent.
    #[inline]
    #[must_use]
    pub const fn is_ready(self, c: Class) -> bool {
        self.contains(Self::CONNECTED.union(Self::ready_flag(c)))
    }

    /// Returns whether any class is ready.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        self.is_connected()
            && self.intersects(Self::MOUSE_READY.union(Self::KBD_READY).union(Self::MEDIA_READY))
    }
}

/// Device-class timing parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timing {
    /// Delay between the press and release reports of a tap or click.
    pub key_delay: Duration,
    /// Number of neutral reports sent after notifications are enabled.
    pub priming: u32,
    /// Interval between priming reports.
    pub priming_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            key_delay: Duration::from_millis(20),
            priming: 2,
            priming_interval: Duration::from_millis(20),
        }
    }
}

/// Current report value shared between a device class and its Input Report
/// characteristic.
#[derive(Debug)]
pub struct ReportCell<const N: usize>(Arc<SyncMutex<[u8; N]>>);

impl<const N: usize> Clone for ReportCell<N> {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<const N: usize> ReportCell<N> {
    /// Creates a cell holding `v`.
    #[inline]
    #[must_use]
    pub fn new(v: [u8; N]) -> Self {
        Self(Arc::new(SyncMutex::new(v)))
    }

    /// Returns the current report.
    #[inline]
    #[must_use]
    pub fn get(&self) -> [u8; N] {
        *self.0.lock()
    }

    /// Replaces the current report.
    #[inline]
    pub fn set(&self, v: [u8; N]) {
        *self.0.lock() = v;
    }

    /// Updates the report with `f` and returns the new value.
    #[inline]
    pub fn update(&self, f: impl FnOnce(&mut [u8; N])) -> [u8; N] {
        let mut v = self.0.lock();
        f(&mut v);
        *v
    }

    /// Returns a read-only I/O callback serving the current report.
    #[must_use]
    pub fn io(&self) -> Io {
        Io::with(&self.0, |v, req| match req {
            IoReq::Read(r) => r.complete(*v.lock()),
            IoReq::Write(_) => Err(ErrorCode::WriteNotPermitted),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hid_state() {
        let s = HidState::CONNECTED | HidState::MOUSE_READY;
        assert!(s.is_ready(Class::Mouse));
        assert!(!s.is_ready(Class::Keyboard));
        assert!(s.is_active());
        assert!(!HidState::MOUSE_READY.is_ready(Class::Mouse));
        assert!(!HidState::CONNECTED.is_active());
        assert_eq!(Class::Media.to_string(), "media");
    }

    #[test]
    fn report_cell() {
        let c = ReportCell::new([1, 0]);
        let io = c.clone().io();
        assert_eq!(c.update(|v| v[1] = 7), [1, 7]);
        let mut r = crate::gatt::ReadReq::new(crate::gatt::Handle::MIN, 0);
        io.exec(IoReq::Read(&mut r)).unwrap();
        assert_eq!(r.into_value(), [1, 7]);
    }
}
