//! Workflow model and shortcut resolution
//!
//! Turns raw key events into candidate shortcuts and resolves them against
//! the configured keyboard-triggered workflows, including multi-key
//! sequences.

pub mod model;
mod normalizer;
mod resolver;

pub use model::{
    is_repeat_safe, is_window_tiling, Command, CommandMeta, Execution, KeyShortcut,
    KeyboardShortcutTrigger, SystemCommandKind, Trigger, UserModeCondition, Workflow,
};
pub use normalizer::{normalize, ShortcutCandidates};
pub use resolver::{LookupResult, PartialMatch, ShortcutResolver, DEFAULT_PARTIAL_MATCH};
