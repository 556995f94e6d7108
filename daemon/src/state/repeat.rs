//! Autorepeat memoization
//!
//! Resolution is too expensive to run at keyboard repeat rate and must not
//! repeat its side effects, so the first key-down's outcome is cached by
//! physical key code and replayed for the OS autorepeats that follow.

use std::sync::Arc;

use crate::hotkey::{KeyEvent, TapDecision};

/// Re-invocable dispatch; the flag tells it whether this is a repeat
pub type DispatchFn = Arc<dyn Fn(&KeyEvent, bool) + Send + Sync>;

/// Cached outcome of a key-down
#[derive(Clone)]
pub struct CachedDispatch {
    pub key_code: u16,
    /// `None` when repeats are only suppressed, not re-run
    pub dispatch: Option<DispatchFn>,
    pub decision: TapDecision,
}

impl std::fmt::Debug for CachedDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDispatch")
            .field("key_code", &self.key_code)
            .field("dispatch", &self.dispatch.is_some())
            .field("decision", &self.decision)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct RepeatCache {
    entry: Option<CachedDispatch>,
    /// Key code whose last resolution found nothing
    missed_key_code: Option<u16>,
}

impl RepeatCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached dispatch for an autorepeat of the cached key
    pub fn should_reuse(&self, event: &KeyEvent) -> Option<CachedDispatch> {
        if !event.is_autorepeat {
            return None;
        }
        self.entry
            .as_ref()
            .filter(|entry| entry.key_code == event.key_code)
            .cloned()
    }

    /// Autorepeat of a key that had no binding: skip resolution entirely
    pub fn should_skip(&self, event: &KeyEvent) -> bool {
        event.is_autorepeat && self.missed_key_code == Some(event.key_code)
    }

    pub fn store(&mut self, key_code: u16, dispatch: Option<DispatchFn>, decision: TapDecision) {
        self.missed_key_code = None;
        self.entry = Some(CachedDispatch {
            key_code,
            dispatch,
            decision,
        });
    }

    pub fn record_miss(&mut self, key_code: u16) {
        self.entry = None;
        self.missed_key_code = Some(key_code);
    }

    /// Drop everything; called on key-up and modifier changes
    pub fn invalidate(&mut self) {
        self.entry = None;
        self.missed_key_code = None;
    }
}
