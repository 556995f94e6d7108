//! Hotkey module for global keyboard event interception
//!
//! Raw event model, key code lookup, and the macOS CGEventTap listener that
//! feeds every key event into the coordinator.

mod event;
pub mod keycodes;
pub mod keys;
mod listener;

pub use event::{EventSource, KeyEvent, KeyEventKind, SyntheticEvent, TapDecision};
pub use keycodes::{AnsiKeyCodeStore, KeyCodeStore};
pub use keys::{ModifierFlags, ModifierKey};
pub use listener::{HotkeyError, HotkeyListener, PostError, SystemEventPoster};
