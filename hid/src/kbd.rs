//! Keyboard HID device.

use crate::descriptor::{Collection, Flag, Item, ReportDescriptor};
use crate::usage::{GenericDesktop, Key, Led, Page};

/// Keyboard input report: report ID, modifiers, reserved, six key slots.
pub type KbdReport = [u8; 9];

/// Maximum number of simultaneously reported non-modifier keys.
pub const MAX_KEYS: usize = 6;

bitflags::bitflags! {
    /// Key modifier flags.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct KeyMod: u8 {
        /// Left Ctrl
        const LCTRL = 1 << 0;
        /// Left Shift
        const LSHIFT = 1 << 1;
        /// Left Alt
        const LALT = 1 << 2;
        /// Left GUI ("Windows key" / Command)
        const LGUI = 1 << 3;
        /// Right Ctrl
        const RCTRL = 1 << 4;
        /// Right Shift
        const RSHIFT = 1 << 5;
        /// Right Alt
        const RALT = 1 << 6;
        /// Right GUI ("Windows key" / Command)
        const RGUI = 1 << 7;
    }
}

impl From<Key> for KeyMod {
    /// Converts a modifier key usage into its modifier bit. Non-modifier keys
    /// map to an empty set.
    fn from(k: Key) -> Self {
        let u = u8::from(k);
        if k.is_modifier() {
            Self::from_bits_truncate(1 << (u - u8::from(Key::LeftCtrl)))
        } else {
            Self::empty()
        }
    }
}

bitflags::bitflags! {
    /// Keyboard LED state written by the host to the output report.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct LedState: u8 {
        const NUM_LOCK = 1 << 0;
        const CAPS_LOCK = 1 << 1;
        const SCROLL_LOCK = 1 << 2;
        const COMPOSE = 1 << 3;
        const KANA = 1 << 4;
    }
}

/// Encodes a keyboard input report. Modifier keys in `keys` are moved into
/// the modifier byte and `Key::None` entries are skipped. Unused key slots are
/// zero.
///
/// # Panics
///
/// Panics if more than [`MAX_KEYS`] non-modifier keys are given.
#[must_use]
pub fn encode(report_id: u8, mut m: KeyMod, keys: &[Key]) -> KbdReport {
    let mut r = [0; 9];
    r[0] = report_id;
    let mut n = 3;
    for &k in keys.iter().filter(|k| !k.is_none()) {
        if k.is_modifier() {
            m |= KeyMod::from(k);
            continue;
        }
        assert!(n < r.len(), "too many keys: {}", keys.len());
        r[n] = k.into();
        n += 1;
    }
    r[1] = m.bits();
    r
}

/// Returns a report with all keys released.
#[inline]
#[must_use]
pub const fn released(report_id: u8) -> KbdReport {
    [report_id, 0, 0, 0, 0, 0, 0, 0, 0]
}

/// Returns the keyboard report descriptor for the specified report ID. The
/// output report carries five LED bits and three bits of padding.
#[rustfmt::skip]
#[must_use]
pub fn report_descriptor(report_id: u8) -> ReportDescriptor {
    use Item::*;
    ReportDescriptor::new([
        GUsagePage(Page::GenericDesktop),
        LUsage(GenericDesktop::Keyboard as _),
        Collection::application([
            GReportId(report_id),

            // Modifier flags
            GUsagePage(Page::Key),
            GReportSize(1),
            GReportCount(8),
            GLogicalMin(0),
            GLogicalMax(1),
            LUsageMin(Key::LeftCtrl as _),
            LUsageMax(Key::RightGui as _),
            MInput(Flag::VAR),

            // Reserved
            GReportSize(8),
            GReportCount(1),
            MInput(Flag::CONST),

            // Keys
            GReportCount(MAX_KEYS as _),
            GLogicalMin(0),
            GLogicalMax(Key::Application as _),
            LUsageMin(0),
            LUsageMax(Key::Application as _),
            MInput(Flag::empty()),

            // Indicators
            GUsagePage(Page::Led),
            GReportSize(1),
            GReportCount(5),
            GLogicalMin(0),
            GLogicalMax(1),
            LUsageMin(Led::NumLock as _),
            LUsageMax(Led::Kana as _),
            MOutput(Flag::VAR),

            // Padding
            GReportSize(3),
            GReportCount(1),
            MOutput(Flag::CONST),
        ]),
    ])
}

/// A single key press with optional modifier keys.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Keystroke {
    pub mods: KeyMod,
    pub key: Key,
}

impl From<Key> for Keystroke {
    #[inline]
    fn from(key: Key) -> Self {
        Self {
            mods: KeyMod::empty(),
            key,
        }
    }
}

impl Keystroke {
    /// Returns a combination of left shift and key.
    #[inline]
    #[must_use]
    pub fn shift(key: Key) -> Self {
        Self {
            mods: KeyMod::LSHIFT,
            key,
        }
    }

    /// Encodes the keystroke as a pressed report.
    #[inline]
    #[must_use]
    pub fn encode(self, report_id: u8) -> KbdReport {
        encode(report_id, self.mods, &[self.key])
    }
}

/// Converts a character into a keystroke using the US keyboard layout. This
/// is the inverse of what the host does when it receives an input report, so
/// the host must be configured with the same layout.
#[allow(clippy::too_many_lines)]
#[must_use]
pub fn us_keystroke(c: char) -> Option<Keystroke> {
    use Key::*;
    let plain = Keystroke::from;
    let shift = Keystroke::shift;
    Some(match c {
        'a'..='z' => plain(letter(c)),
        'A'..='Z' => shift(letter(c.to_ascii_lowercase())),
        '1'..='9' => plain(digit(c)),
        '0' => plain(Num0),

        '`' => plain(Backquote),
        '-' => plain(Minus),
        '=' => plain(Equals),
        '[' => plain(LeftBracket),
        ']' => plain(RightBracket),
        '\\' => plain(Backslash),
        ';' => plain(Semicolon),
        '\'' => plain(Quote),
        ',' => plain(Comma),
        '.' => plain(Period),
        '/' => plain(Slash),

        '~' => shift(Backquote),
        '!' => shift(Num1),
        '@' => shift(Num2),
        '#' => shift(Num3),
        '$' => shift(Num4),
        '%' => shift(Num5),
        '^' => shift(Num6),
        '&' => shift(Num7),
        '*' => shift(Num8),
        '(' => shift(Num9),
        ')' => shift(Num0),
        '_' => shift(Minus),
        '+' => shift(Equals),
        '{' => shift(LeftBracket),
        '}' => shift(RightBracket),
        '|' => shift(Backslash),
        ':' => shift(Semicolon),
        '"' => shift(Quote),
        '<' => shift(Comma),
        '>' => shift(Period),
        '?' => shift(Slash),

        ' ' => plain(Space),
        '\t' => plain(Tab),
        '\n' => plain(Enter),
        '\u{08}' => plain(Backspace),
        '\u{1B}' => plain(Escape),
        '\u{7F}' => plain(Delete),
        _ => return Option::None,
    })
}

/// Maps an ASCII lowercase letter to its usage.
#[allow(clippy::cast_possible_truncation)]
fn letter(c: char) -> Key {
    Key::from(u8::from(Key::A) + (c as u8 - b'a'))
}

/// Maps an ASCII digit 1-9 to its usage.
#[allow(clippy::cast_possible_truncation)]
fn digit(c: char) -> Key {
    Key::from(u8::from(Key::Num1) + (c as u8 - b'1'))
}
