//! Raw keyboard events as delivered by the event tap

use serde::{Deserialize, Serialize};

use super::keys::ModifierFlags;

/// Kind of event delivered by the tap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
    FlagsChanged,
    MouseButton,
}

/// One raw event from the OS event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    /// Physical (virtual) key code
    pub key_code: u16,
    pub flags: ModifierFlags,
    /// Set by the OS for autorepeat key-downs
    pub is_autorepeat: bool,
    /// Milliseconds on the tap's monotonic clock
    pub timestamp: u64,
}

impl KeyEvent {
    pub fn key_down(key_code: u16, flags: ModifierFlags) -> Self {
        Self {
            kind: KeyEventKind::KeyDown,
            key_code,
            flags,
            is_autorepeat: false,
            timestamp: 0,
        }
    }

    pub fn key_up(key_code: u16, flags: ModifierFlags) -> Self {
        Self {
            kind: KeyEventKind::KeyUp,
            ..Self::key_down(key_code, flags)
        }
    }

    pub fn flags_changed(key_code: u16, flags: ModifierFlags) -> Self {
        Self {
            kind: KeyEventKind::FlagsChanged,
            ..Self::key_down(key_code, flags)
        }
    }

    /// Same event, flagged as an OS autorepeat
    pub fn repeating(mut self) -> Self {
        self.is_autorepeat = true;
        self
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// What the tap should do with the event after the coordinator saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDecision {
    /// Deliver the event to the focused application
    Forward,
    /// Clear the event so no application receives it
    Suppress,
}

impl TapDecision {
    pub fn is_suppressed(self) -> bool {
        matches!(self, TapDecision::Suppress)
    }
}

/// A key event posted by this daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticEvent {
    pub key_code: u16,
    pub key_down: bool,
    pub flags: ModifierFlags,
    /// Mark the posted event as an autorepeat
    pub autorepeat: bool,
}

impl SyntheticEvent {
    /// Down/up pair for one key press
    pub fn press(key_code: u16, flags: ModifierFlags) -> [SyntheticEvent; 2] {
        [
            SyntheticEvent {
                key_code,
                key_down: true,
                flags,
                autorepeat: false,
            },
            SyntheticEvent {
                key_code,
                key_down: false,
                flags,
                autorepeat: false,
            },
        ]
    }
}

/// Which event source synthetic events are attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventSource {
    /// Private source: does not inherit the physical modifier state
    #[default]
    Private,
    /// Combined session state
    CombinedSession,
}
