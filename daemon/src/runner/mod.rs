//! Collaborators the coordinator dispatches to
//!
//! The coordinator only sees these traits. The daemon wires them to the
//! task-based workflow runner, the synthetic keyboard, the process executor
//! and the broadcast notifier defined in the submodules.

mod dispatch;
mod executor;
mod keyboard;
mod notify;

use std::sync::Arc;

use crate::hotkey::{EventSource, KeyEvent, SyntheticEvent};
use crate::workflow::{Command, Execution, KeyShortcut, PartialMatch, Workflow};

pub use crate::hotkey::PostError;
pub use dispatch::{CancelToken, TaskRunner};
pub use executor::ProcessExecutor;
pub use keyboard::SyntheticKeyboard;
pub use notify::{EventNotifier, NotificationPreferences};

/// Runs a matched workflow off the tap thread
pub trait WorkflowRunner: Send + Sync {
    fn run(
        &self,
        workflow: &Arc<Workflow>,
        shortcut: &KeyShortcut,
        event: &KeyEvent,
        repeating: bool,
        execution_override: Option<Execution>,
    );
}

/// Posts the shortcuts of a keyboard command as synthetic events
pub trait KeyboardCommandRunner: Send + Sync {
    fn run(
        &self,
        shortcuts: &[KeyShortcut],
        original_event: Option<&KeyEvent>,
        is_repeating: bool,
        source: EventSource,
    ) -> Vec<SyntheticEvent>;
}

/// UI affordances; implementations drop calls the user has disabled
pub trait Notifier: Send + Sync {
    fn notify_bundles(&self, partial_match: &PartialMatch);
    fn notify_keyboard_command(&self, workflow: &Workflow, command: &Command);
    fn notify_running_workflow(&self, workflow: &Workflow);
    fn reset(&self);
}

/// Delivers one synthetic event to the OS
pub trait EventPoster: Send + Sync {
    fn post(&self, event: &SyntheticEvent, source: EventSource) -> Result<(), PostError>;
}

/// Executes a single concrete command
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &Command, repeating: bool) -> Result<(), CommandError>;
}

/// Errors from executing a command
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0} commands are not supported by this executor")]
    Unsupported(&'static str),

    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("process exited with status {0:?}")]
    ExitStatus(Option<i32>),

    #[error("keyboard command posted no events")]
    NothingPosted,
}
