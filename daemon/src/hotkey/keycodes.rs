//! Key code store: physical key code <-> display string
//!
//! Key codes are macOS virtual key codes (HIToolbox/Events.h). They name
//! physical positions, so the built-in table assumes an ANSI layout. Letters
//! are reported lowercase; configured shortcuts usually store them uppercase,
//! which is why the normalizer also tries an uppercased candidate.

use std::collections::{HashMap, HashSet};

pub const RETURN: u16 = 0x24;
pub const TAB: u16 = 0x30;
pub const BACKSPACE: u16 = 0x33;
pub const ESCAPE: u16 = 0x35;
pub const KEYPAD_ENTER: u16 = 0x4C;
pub const FORWARD_DELETE: u16 = 0x75;

pub const ESCAPE_NAME: &str = "Escape";

/// Bidirectional key code lookup consumed by the coordinator
pub trait KeyCodeStore: Send + Sync {
    /// Display string for a physical key code
    fn display_value(&self, key_code: u16) -> Option<String>;

    /// Physical key code for a display string (case-insensitive)
    fn key_code(&self, display_value: &str) -> Option<u16>;

    /// Keys the OS decorates with the Fn flag and that need settling time
    /// around them during playback
    fn special_keys(&self) -> &HashSet<u16>;
}

const TABLE: &[(u16, &str)] = &[
    (0x00, "a"),
    (0x0B, "b"),
    (0x08, "c"),
    (0x02, "d"),
    (0x0E, "e"),
    (0x03, "f"),
    (0x05, "g"),
    (0x04, "h"),
    (0x22, "i"),
    (0x26, "j"),
    (0x28, "k"),
    (0x25, "l"),
    (0x2E, "m"),
    (0x2D, "n"),
    (0x1F, "o"),
    (0x23, "p"),
    (0x0C, "q"),
    (0x0F, "r"),
    (0x01, "s"),
    (0x11, "t"),
    (0x20, "u"),
    (0x09, "v"),
    (0x0D, "w"),
    (0x07, "x"),
    (0x10, "y"),
    (0x06, "z"),
    (0x1D, "0"),
    (0x12, "1"),
    (0x13, "2"),
    (0x14, "3"),
    (0x15, "4"),
    (0x17, "5"),
    (0x16, "6"),
    (0x1A, "7"),
    (0x1C, "8"),
    (0x19, "9"),
    (0x1B, "-"),
    (0x18, "="),
    (0x21, "["),
    (0x1E, "]"),
    (0x2A, "\\"),
    (0x29, ";"),
    (0x27, "'"),
    (0x2B, ","),
    (0x2F, "."),
    (0x2C, "/"),
    (0x32, "`"),
    (0x7A, "F1"),
    (0x78, "F2"),
    (0x63, "F3"),
    (0x76, "F4"),
    (0x60, "F5"),
    (0x61, "F6"),
    (0x62, "F7"),
    (0x64, "F8"),
    (0x65, "F9"),
    (0x6D, "F10"),
    (0x67, "F11"),
    (0x6F, "F12"),
    (0x69, "F13"),
    (0x6B, "F14"),
    (0x71, "F15"),
    (0x6A, "F16"),
    (0x40, "F17"),
    (0x4F, "F18"),
    (0x50, "F19"),
    (0x5A, "F20"),
    (0x31, "Space"),
    (RETURN, "Return"),
    (KEYPAD_ENTER, "Enter"),
    (TAB, "Tab"),
    (ESCAPE, ESCAPE_NAME),
    (BACKSPACE, "Backspace"),
    (FORWARD_DELETE, "ForwardDelete"),
    (0x72, "Help"),
    (0x73, "Home"),
    (0x77, "End"),
    (0x74, "PageUp"),
    (0x79, "PageDown"),
    (0x7E, "Up"),
    (0x7D, "Down"),
    (0x7B, "Left"),
    (0x7C, "Right"),
    (0x37, "Command"),
    (0x36, "RightCommand"),
    (0x38, "Shift"),
    (0x3C, "RightShift"),
    (0x3A, "Option"),
    (0x3D, "RightOption"),
    (0x3B, "Control"),
    (0x3E, "RightControl"),
    (0x3F, "Function"),
    (0x39, "CapsLock"),
];

const SPECIAL: &[u16] = &[
    0x7A, 0x78, 0x63, 0x76, 0x60, 0x61, 0x62, 0x64, 0x65, 0x6D, 0x67, 0x6F, 0x69, 0x6B, 0x71,
    0x6A, 0x40, 0x4F, 0x50, 0x5A, // F1-F20
    0x72, 0x73, 0x77, 0x74, 0x79, FORWARD_DELETE, // navigation block
    0x7E, 0x7D, 0x7B, 0x7C, // arrows
    RETURN, KEYPAD_ENTER, TAB, ESCAPE,
];

/// Static ANSI US layout table
pub struct AnsiKeyCodeStore {
    by_code: HashMap<u16, &'static str>,
    by_value: HashMap<String, u16>,
    special: HashSet<u16>,
}

impl AnsiKeyCodeStore {
    pub fn new() -> Self {
        let by_code = TABLE.iter().copied().collect();
        let by_value = TABLE
            .iter()
            .map(|(code, value)| (value.to_lowercase(), *code))
            .collect();
        Self {
            by_code,
            by_value,
            special: SPECIAL.iter().copied().collect(),
        }
    }
}

impl Default for AnsiKeyCodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCodeStore for AnsiKeyCodeStore {
    fn display_value(&self, key_code: u16) -> Option<String> {
        self.by_code.get(&key_code).map(|value| value.to_string())
    }

    fn key_code(&self, display_value: &str) -> Option<u16> {
        self.by_value.get(&display_value.to_lowercase()).copied()
    }

    fn special_keys(&self) -> &HashSet<u16> {
        &self.special
    }
}
