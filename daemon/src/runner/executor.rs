//! Default command executor
//!
//! Covers the command kinds that map directly onto a process or the
//! synthetic keyboard. Menu bar, system and text commands need the
//! accessibility layer and are reported as unsupported.

use std::process::{Command as Process, ExitStatus};
use std::sync::Arc;

use tracing::debug;

use crate::hotkey::EventSource;
use crate::workflow::model::ApplicationAction;
use crate::workflow::Command;

use super::{CommandError, CommandExecutor, KeyboardCommandRunner};

pub struct ProcessExecutor {
    keyboard: Arc<dyn KeyboardCommandRunner>,
}

impl ProcessExecutor {
    pub fn new(keyboard: Arc<dyn KeyboardCommandRunner>) -> Self {
        Self { keyboard }
    }
}

impl CommandExecutor for ProcessExecutor {
    fn execute(&self, command: &Command, repeating: bool) -> Result<(), CommandError> {
        debug!(kind = command.kind_name(), name = %command.meta().name, "executing command");

        match command {
            Command::Keyboard {
                shortcuts,
                iterations,
                ..
            } => {
                let mut posted = 0;
                for _ in 0..(*iterations).max(1) {
                    posted += self
                        .keyboard
                        .run(shortcuts, None, repeating, EventSource::Private)
                        .len();
                }
                if posted == 0 {
                    return Err(CommandError::NothingPosted);
                }
                Ok(())
            }
            Command::Open { path, .. } => check(Process::new("open").arg(path).status()?),
            Command::Application {
                bundle_identifier,
                action,
                ..
            } => match action {
                ApplicationAction::Open => {
                    check(Process::new("open").args(["-b", bundle_identifier]).status()?)
                }
                ApplicationAction::Close => osascript(&format!(
                    "tell application id \"{bundle_identifier}\" to quit"
                )),
                ApplicationAction::Hide => osascript(&format!(
                    "tell application \"System Events\" to set visible of (first process whose bundle identifier is \"{bundle_identifier}\") to false"
                )),
            },
            Command::Script { source, .. } => check(Process::new("sh").args(["-c", source]).status()?),
            Command::MenuBar { .. } | Command::System { .. } | Command::Text { .. } => {
                Err(CommandError::Unsupported(command.kind_name()))
            }
        }
    }
}

fn osascript(script: &str) -> Result<(), CommandError> {
    check(Process::new("osascript").args(["-e", script]).status()?)
}

fn check(status: ExitStatus) -> Result<(), CommandError> {
    if status.success() {
        Ok(())
    } else {
        Err(CommandError::ExitStatus(status.code()))
    }
}
