//! Keyboard command runner backed by synthetic events

use std::sync::Arc;

use tracing::{trace, warn};

use crate::hotkey::{EventSource, KeyCodeStore, KeyEvent, ModifierFlags, SyntheticEvent};
use crate::workflow::KeyShortcut;

use super::{EventPoster, KeyboardCommandRunner};

/// Turns shortcuts into down/up pairs and posts them
pub struct SyntheticKeyboard {
    key_codes: Arc<dyn KeyCodeStore>,
    poster: Arc<dyn EventPoster>,
}

impl SyntheticKeyboard {
    pub fn new(key_codes: Arc<dyn KeyCodeStore>, poster: Arc<dyn EventPoster>) -> Self {
        Self { key_codes, poster }
    }
}

impl KeyboardCommandRunner for SyntheticKeyboard {
    fn run(
        &self,
        shortcuts: &[KeyShortcut],
        original_event: Option<&KeyEvent>,
        is_repeating: bool,
        source: EventSource,
    ) -> Vec<SyntheticEvent> {
        trace!(
            count = shortcuts.len(),
            trigger = original_event.map(|e| e.key_code),
            is_repeating,
            "posting keyboard command"
        );

        let mut posted = Vec::with_capacity(shortcuts.len() * 2);
        for shortcut in shortcuts {
            let Some(key_code) = self.key_codes.key_code(&shortcut.key) else {
                warn!(key = %shortcut.key, "no key code for shortcut key");
                continue;
            };
            let flags = ModifierFlags::from_modifiers(&shortcut.modifiers, shortcut.lhs);
            for mut event in SyntheticEvent::press(key_code, flags) {
                event.autorepeat = is_repeating;
                // A failed post does not stop the rest of the command
                if let Err(e) = self.poster.post(&event, source) {
                    warn!(key_code, %e, "failed to post synthetic event");
                    continue;
                }
                posted.push(event);
            }
        }
        posted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{keys::flags, AnsiKeyCodeStore, ModifierKey};
    use crate::testing::RecordingPoster;

    #[test]
    fn test_posts_down_up_pairs_with_modifiers() {
        let poster = Arc::new(RecordingPoster::default());
        let keyboard = SyntheticKeyboard::new(Arc::new(AnsiKeyCodeStore::new()), poster.clone());

        let events = keyboard.run(
            &[KeyShortcut::new("C", [ModifierKey::Command])],
            None,
            false,
            EventSource::Private,
        );

        assert_eq!(events.len(), 2);
        assert!(events[0].key_down);
        assert!(!events[1].key_down);
        assert_eq!(events[0].key_code, 0x08);
        assert!(events[0].flags.contains(flags::COMMAND | flags::LEFT_COMMAND));
        assert_eq!(poster.posted().len(), 2);
    }

    #[test]
    fn test_unknown_keys_are_skipped() {
        let poster = Arc::new(RecordingPoster::default());
        let keyboard = SyntheticKeyboard::new(Arc::new(AnsiKeyCodeStore::new()), poster.clone());

        let events = keyboard.run(
            &[KeyShortcut::new("NoSuchKey", []), KeyShortcut::new("a", [])],
            None,
            true,
            EventSource::Private,
        );
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.autorepeat));
    }

    #[test]
    fn test_failed_posts_do_not_abort() {
        let poster = Arc::new(RecordingPoster::failing_on(0x00));
        let keyboard = SyntheticKeyboard::new(Arc::new(AnsiKeyCodeStore::new()), poster.clone());

        let events = keyboard.run(
            &[KeyShortcut::new("a", []), KeyShortcut::new("b", [])],
            None,
            false,
            EventSource::Private,
        );
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.key_code == 0x0B));
    }
}
