//! Derives candidate shortcuts from one raw event
//!
//! Layout differences and modifier timing races make the OS report a key
//! in a form that does not literally match configuration. Three candidates
//! are produced and tried in order: as typed, uppercased, and with the
//! modifier side forced to right-hand.

use crate::hotkey::{KeyCodeStore, KeyEvent, ModifierKey};

use super::model::KeyShortcut;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutCandidates {
    pub original: KeyShortcut,
    pub uppercase: KeyShortcut,
    pub lhs_agnostic: KeyShortcut,
}

/// Build the candidates for `event`, or `None` when its key code has no
/// display value and the event must pass through untouched.
pub fn normalize(event: &KeyEvent, store: &dyn KeyCodeStore) -> Option<ShortcutCandidates> {
    let key = store.display_value(event.key_code)?;

    let mut modifiers = event.flags.modifiers();
    // The OS sets Fn on arrows and function keys by itself
    if store.special_keys().contains(&event.key_code) {
        modifiers.remove(&ModifierKey::Function);
    }

    let original = KeyShortcut {
        id: String::new(),
        key: key.clone(),
        lhs: event.flags.is_left_hand(),
        modifiers,
    };
    let uppercase = KeyShortcut {
        key: key.to_uppercase(),
        ..original.clone()
    };
    let lhs_agnostic = KeyShortcut {
        lhs: false,
        ..original.clone()
    };

    Some(ShortcutCandidates {
        original,
        uppercase,
        lhs_agnostic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys::flags;
    use crate::hotkey::{AnsiKeyCodeStore, ModifierFlags};

    #[test]
    fn test_three_candidates() {
        let store = AnsiKeyCodeStore::new();
        let event = KeyEvent::key_down(0x28, ModifierFlags(flags::COMMAND | flags::LEFT_COMMAND));
        let candidates = normalize(&event, &store).unwrap();

        assert_eq!(candidates.original.signature(), "Cmd+k");
        assert_eq!(candidates.uppercase.signature(), "Cmd+K");
        assert_eq!(candidates.lhs_agnostic.signature(), "Cmd+k:rhs");
        assert!(candidates.original.lhs);
    }

    #[test]
    fn test_unknown_key_yields_none() {
        let store = AnsiKeyCodeStore::new();
        let event = KeyEvent::key_down(0xFF, ModifierFlags::empty());
        assert!(normalize(&event, &store).is_none());
    }

    #[test]
    fn test_function_flag_dropped_for_special_keys() {
        let store = AnsiKeyCodeStore::new();
        // Up arrow arrives with Fn set by the OS
        let event = KeyEvent::key_down(0x7E, ModifierFlags(flags::FUNCTION | flags::SHIFT));
        let candidates = normalize(&event, &store).unwrap();
        assert_eq!(candidates.original.signature(), "Shift+Up");

        // Regular keys keep an explicit Fn
        let event = KeyEvent::key_down(0x00, ModifierFlags(flags::FUNCTION));
        let candidates = normalize(&event, &store).unwrap();
        assert_eq!(candidates.original.signature(), "Fn+a");
    }

    #[test]
    fn test_right_hand_modifier_sets_lhs_false() {
        let store = AnsiKeyCodeStore::new();
        let event = KeyEvent::key_down(0x0B, ModifierFlags(flags::COMMAND | flags::RIGHT_COMMAND));
        let candidates = normalize(&event, &store).unwrap();
        assert!(!candidates.original.lhs);
        assert_eq!(candidates.original.signature(), "Cmd+b:rhs");
    }
}
