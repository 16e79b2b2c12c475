//! Mouse HID device.

use crate::descriptor::{Collection, Flag, Item, ReportDescriptor};
use crate::usage::{GenericDesktop, Page};

/// Mouse input report: report ID, buttons, X, Y, wheel.
pub type MouseReport = [u8; 5];

/// Range of each relative axis. -128 is excluded so that every value has a
/// symmetric counterpart.
pub const AXIS_MIN: i8 = -127;

/// Maximum value of each relative axis.
pub const AXIS_MAX: i8 = 127;

bitflags::bitflags! {
    /// Mouse buttons.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Button: u8 {
        const PRIMARY = 1 << 0;
        const SECONDARY = 1 << 1;
        const TERTIARY = 1 << 2;
        const BACK = 1 << 3;
        const FORWARD = 1 << 4;
    }
}

/// Encodes a mouse input report.
///
/// # Panics
///
/// Panics if any axis value is outside `[AXIS_MIN, AXIS_MAX]`. Callers are
/// expected to validate user input before encoding.
#[allow(clippy::cast_sign_loss)]
#[must_use]
pub fn encode(report_id: u8, btn: Button, dx: i8, dy: i8, wheel: i8) -> MouseReport {
    assert!(
        dx >= AXIS_MIN && dy >= AXIS_MIN && wheel >= AXIS_MIN,
        "mouse axis out of range"
    );
    [report_id, btn.bits(), dx as u8, dy as u8, wheel as u8]
}

/// Returns a report with no buttons pressed and no movement.
#[inline]
#[must_use]
pub const fn neutral(report_id: u8) -> MouseReport {
    [report_id, 0, 0, 0, 0]
}

/// Returns the mouse report descriptor for the specified report ID.
#[rustfmt::skip]
#[must_use]
pub fn report_descriptor(report_id: u8) -> ReportDescriptor {
    use Item::*;
    ReportDescriptor::new([
        GUsagePage(Page::GenericDesktop),
        LUsage(GenericDesktop::Mouse as _),
        Collection::application([
            GReportId(report_id),
            LUsage(GenericDesktop::Pointer as _),
            Collection::physical([
                // Buttons
                GUsagePage(Page::Button),
                GReportSize(1),
                GReportCount(8),
                GLogicalMin(0),
                GLogicalMax(1),
                LUsageMin(0x01), // Button 1 (primary)
                LUsageMax(0x08), // Button 8
                MInput(Flag::VAR),

                // Movement and scrolling
                GUsagePage(Page::GenericDesktop),
                GReportSize(8),
                GReportCount(3),
                GLogicalMin(i32::from(AXIS_MIN)),
                GLogicalMax(i32::from(AXIS_MAX)),
                LUsage(GenericDesktop::X as _),
                LUsage(GenericDesktop::Y as _),
                LUsage(GenericDesktop::Wheel as _),
                MInput(Flag::VAR | Flag::REL),
            ]),
        ]),
    ])
}
