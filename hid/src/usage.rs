//! HID usage tables (\[HUT\]) for the pages used by mouse, keyboard, and
//! consumer-control devices.

/// Usage page IDs (\[HUT\] Section 3).
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
#[repr(u16)]
pub enum Page {
    /// Generic Desktop Page.
    GenericDesktop = 0x01,
    /// Keyboard/Keypad Page.
    Key = 0x07,
    /// LED Page.
    Led = 0x08,
    /// Button Page.
    Button = 0x09,
    /// Consumer Page.
    Consumer = 0x0C,
}

/// Generic Desktop usage IDs (\[HUT\] Section 4).
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
#[repr(u8)]
pub enum GenericDesktop {
    Pointer = 0x01,
    Mouse = 0x02,
    Keyboard = 0x06,
    X = 0x30,
    Y = 0x31,
    Wheel = 0x38,
}

/// Keyboard/Keypad usage IDs (\[HUT\] Section 10).
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    num_enum::IntoPrimitive,
    num_enum::FromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Key {
    #[default]
    /// No key.
    None = 0x00,
    /// Keyboard ErrorRollOver.
    ErrRollOver = 0x01,
    A = 0x04,
    B = 0x05,
    C = 0x06,
    D = 0x07,
    E = 0x08,
    F = 0x09,
    G = 0x0A,
    H = 0x0B,
    I = 0x0C,
    J = 0x0D,
    K = 0x0E,
    L = 0x0F,
    M = 0x10,
    N = 0x11,
    O = 0x12,
    P = 0x13,
    Q = 0x14,
    R = 0x15,
    S = 0x16,
    T = 0x17,
    U = 0x18,
    V = 0x19,
    W = 0x1A,
    X = 0x1B,
    Y = 0x1C,
    Z = 0x1D,
    Num1 = 0x1E,
    Num2 = 0x1F,
    Num3 = 0x20,
    Num4 = 0x21,
    Num5 = 0x22,
    Num6 = 0x23,
    Num7 = 0x24,
    Num8 = 0x25,
    Num9 = 0x26,
    Num0 = 0x27,
    /// Keyboard Return (ENTER).
    Enter = 0x28,
    Escape = 0x29,
    /// Keyboard DELETE (Backspace).
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    /// Keyboard - and _.
    Minus = 0x2D,
    /// Keyboard = and +.
    Equals = 0x2E,
    /// Keyboard [ and {.
    LeftBracket = 0x2F,
    /// Keyboard ] and }.
    RightBracket = 0x30,
    /// Keyboard \ and |.
    Backslash = 0x31,
    /// Keyboard ; and :.
    Semicolon = 0x33,
    /// Keyboard ' and ".
    Quote = 0x34,
    /// Keyboard ` and ~.
    Backquote = 0x35,
    /// Keyboard , and <.
    Comma = 0x36,
    /// Keyboard . and >.
    Period = 0x37,
    /// Keyboard / and ?.
    Slash = 0x38,
    CapsLock = 0x39,
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,
    PrintScreen = 0x46,
    ScrollLock = 0x47,
    Pause = 0x48,
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    /// Keyboard Delete Forward.
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    RightArrow = 0x4F,
    LeftArrow = 0x50,
    DownArrow = 0x51,
    UpArrow = 0x52,
    NumLock = 0x53,
    /// Keyboard Application (context menu).
    Application = 0x65,
    /// Keyboard LeftControl.
    LeftCtrl = 0xE0,
    /// Keyboard LeftShift.
    LeftShift = 0xE1,
    /// Keyboard LeftAlt.
    LeftAlt = 0xE2,
    /// Keyboard Left GUI.
    LeftGui = 0xE3,
    /// Keyboard RightControl.
    RightCtrl = 0xE4,
    /// Keyboard RightShift.
    RightShift = 0xE5,
    /// Keyboard RightAlt.
    RightAlt = 0xE6,
    /// Keyboard Right GUI.
    RightGui = 0xE7,
}

impl Key {
    /// Returns whether the key is `None`.
    #[inline(always)]
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns whether the key is one of the eight modifier keys, which are
    /// reported in the modifier byte rather than the key array.
    #[inline]
    #[must_use]
    pub const fn is_modifier(self) -> bool {
        matches!(
            self,
            Self::LeftCtrl
                | Self::LeftShift
                | Self::LeftAlt
                | Self::LeftGui
                | Self::RightCtrl
                | Self::RightShift
                | Self::RightAlt
                | Self::RightGui
        )
    }
}

/// LED usage IDs (\[HUT\] Section 11).
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
#[repr(u8)]
pub enum Led {
    NumLock = 0x01,
    CapsLock = 0x02,
    ScrollLock = 0x03,
    Compose = 0x04,
    Kana = 0x05,
}

/// Consumer usage IDs that fit the 8-bit consumer report
/// (\[HUT\] Section 15).
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Consumer {
    ConsumerControl = 0x01,
    ScanNextTrack = 0xB5,
    ScanPreviousTrack = 0xB6,
    Stop = 0xB7,
    PlayPause = 0xCD,
    Mute = 0xE2,
    VolumeIncrement = 0xE9,
    VolumeDecrement = 0xEA,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_primitive() {
        assert_eq!(u8::from(Key::C), 0x06);
        assert_eq!(Key::from(0x06), Key::C);
        assert_eq!(Key::from(0x02), Key::None);
        assert!(Key::RightGui.is_modifier());
        assert!(!Key::A.is_modifier());
    }

    #[test]
    fn consumer_primitive() {
        assert_eq!(u8::from(Consumer::PlayPause), 0xCD);
        assert_eq!(Consumer::try_from(0xE9).ok(), Some(Consumer::VolumeIncrement));
        assert!(Consumer::try_from(0x00).is_err());
    }
}
