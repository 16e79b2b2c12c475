//! Consumer control (media key) HID device.

use crate::descriptor::{Collection, Flag, Item, ReportDescriptor};
use crate::usage::{Consumer, Page};

/// Consumer control input report: report ID and one usage code.
pub type ConsumerReport = [u8; 2];

/// Encodes a consumer control report. Code 0 releases the control.
#[inline]
#[must_use]
pub const fn encode(report_id: u8, code: u8) -> ConsumerReport {
    [report_id, code]
}

/// Returns the consumer control report descriptor for the specified report
/// ID. The report is a one-byte usage array, so any 8-bit consumer usage can
/// be sent.
#[rustfmt::skip]
#[must_use]
pub fn report_descriptor(report_id: u8) -> ReportDescriptor {
    use Item::*;
    ReportDescriptor::new([
        GUsagePage(Page::Consumer),
        LUsage(Consumer::ConsumerControl as _),
        Collection::application([
            GReportId(report_id),
            GReportSize(8),
            GReportCount(1),
            GLogicalMin(0),
            GLogicalMax(0xFF),
            LUsageMin(0),
            LUsageMax(0xFF),
            MInput(Flag::empty()),
        ]),
    ])
}
