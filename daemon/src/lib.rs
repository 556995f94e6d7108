//! keyflow: global keyboard automation core
//!
//! Intercepts every key event system-wide, resolves it against the user's
//! keyboard-triggered workflows (including multi-key sequences scoped per
//! application), and dispatches the match. Also records and replays
//! per-application keyboard macros and captures shortcuts for the
//! workflow editor.

pub mod config;
pub mod events;
pub mod hotkey;
pub mod ipc;
pub mod lifecycle;
pub mod runner;
pub mod state;
pub mod workflow;

#[cfg(test)]
mod testing;
