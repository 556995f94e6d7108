//! Coordinator state module
//!
//! The event coordinator and the sub-machines it owns:
//! - Mode: which branch handles events (disabled, intercept, recording, capture)
//! - Repeat cache: replays a key-down's dispatch for OS autorepeats
//! - Hold scheduler: deferred, cancellable dispatch for hold triggers
//! - Macro coordinator: per-application macro record, removal and playback

mod hold;
mod machine;
mod macros;
mod repeat;

pub use hold::{HoldHandle, HoldScheduler};
pub use machine::{Collaborators, CoordinatorStatus, EventCoordinator, Inputs, KeystrokeRecording, Mode};
pub use macros::{MacroCoordinator, MacroElement, MacroKey, MacroPlayer, MacroState, PlaybackReport};
pub use repeat::{CachedDispatch, RepeatCache};
