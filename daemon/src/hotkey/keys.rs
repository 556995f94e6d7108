//! Modifier key definitions and flag decoding
//!
//! Mirrors the macOS `CGEventFlags` layout so flags read from the event tap
//! can be stored and compared without conversion. The low bits carry the
//! device-dependent left/right information used for `lhs` matching.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw modifier flag masks (CGEventFlags / NX device masks)
pub mod flags {
    /// Caps lock is engaged
    pub const CAPS_LOCK: u64 = 0x0001_0000;
    /// Either Shift key
    pub const SHIFT: u64 = 0x0002_0000;
    /// Either Control key
    pub const CONTROL: u64 = 0x0004_0000;
    /// Either Option/Alt key
    pub const OPTION: u64 = 0x0008_0000;
    /// Either Command key
    pub const COMMAND: u64 = 0x0010_0000;
    /// Key lives on the numeric keypad
    pub const NUMERIC_PAD: u64 = 0x0020_0000;
    /// Fn key, also set by the OS for arrows and function keys
    pub const FUNCTION: u64 = 0x0080_0000;

    pub const LEFT_CONTROL: u64 = 0x0000_0001;
    pub const LEFT_SHIFT: u64 = 0x0000_0002;
    pub const RIGHT_SHIFT: u64 = 0x0000_0004;
    pub const LEFT_COMMAND: u64 = 0x0000_0008;
    pub const RIGHT_COMMAND: u64 = 0x0000_0010;
    pub const LEFT_OPTION: u64 = 0x0000_0020;
    pub const RIGHT_OPTION: u64 = 0x0000_0040;
    pub const RIGHT_CONTROL: u64 = 0x0000_2000;

    /// Every right-hand device bit
    pub const RIGHT_HAND: u64 = RIGHT_SHIFT | RIGHT_COMMAND | RIGHT_OPTION | RIGHT_CONTROL;
}

/// A modifier that can take part in a shortcut
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKey {
    Function,
    Shift,
    Control,
    Option,
    Command,
    CapsLock,
}

impl ModifierKey {
    /// Device-independent flag mask for this modifier
    pub fn mask(self) -> u64 {
        match self {
            ModifierKey::Function => flags::FUNCTION,
            ModifierKey::Shift => flags::SHIFT,
            ModifierKey::Control => flags::CONTROL,
            ModifierKey::Option => flags::OPTION,
            ModifierKey::Command => flags::COMMAND,
            ModifierKey::CapsLock => flags::CAPS_LOCK,
        }
    }

    /// Left-hand device mask, used when posting synthetic events
    pub fn left_mask(self) -> u64 {
        match self {
            ModifierKey::Shift => flags::LEFT_SHIFT,
            ModifierKey::Control => flags::LEFT_CONTROL,
            ModifierKey::Option => flags::LEFT_OPTION,
            ModifierKey::Command => flags::LEFT_COMMAND,
            ModifierKey::Function | ModifierKey::CapsLock => 0,
        }
    }

    /// Right-hand device mask
    pub fn right_mask(self) -> u64 {
        match self {
            ModifierKey::Shift => flags::RIGHT_SHIFT,
            ModifierKey::Control => flags::RIGHT_CONTROL,
            ModifierKey::Option => flags::RIGHT_OPTION,
            ModifierKey::Command => flags::RIGHT_COMMAND,
            ModifierKey::Function | ModifierKey::CapsLock => 0,
        }
    }

    const ALL: [ModifierKey; 6] = [
        ModifierKey::Function,
        ModifierKey::Shift,
        ModifierKey::Control,
        ModifierKey::Option,
        ModifierKey::Command,
        ModifierKey::CapsLock,
    ];
}

impl fmt::Display for ModifierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModifierKey::Function => "Fn",
            ModifierKey::Shift => "Shift",
            ModifierKey::Control => "Ctrl",
            ModifierKey::Option => "Opt",
            ModifierKey::Command => "Cmd",
            ModifierKey::CapsLock => "Caps",
        };
        f.write_str(name)
    }
}

/// Modifier flag bitset as reported by the OS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierFlags(pub u64);

impl ModifierFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, mask: u64) -> bool {
        self.0 & mask == mask
    }

    /// Build flags for a set of modifiers, placing them on the given side
    pub fn from_modifiers(modifiers: &BTreeSet<ModifierKey>, lhs: bool) -> Self {
        let bits = modifiers.iter().fold(0, |acc, modifier| {
            let side = if lhs {
                modifier.left_mask()
            } else {
                modifier.right_mask()
            };
            acc | modifier.mask() | side
        });
        Self(bits)
    }

    /// The set of device-independent modifiers that are held
    pub fn modifiers(self) -> BTreeSet<ModifierKey> {
        ModifierKey::ALL
            .into_iter()
            .filter(|modifier| self.contains(modifier.mask()))
            .collect()
    }

    /// Whether any modifier key is held
    pub fn has_modifiers(self) -> bool {
        ModifierKey::ALL
            .into_iter()
            .any(|modifier| self.contains(modifier.mask()))
    }

    /// True unless a right-hand modifier is held
    pub fn is_left_hand(self) -> bool {
        self.0 & flags::RIGHT_HAND == 0
    }
}
