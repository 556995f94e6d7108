//! Task-based workflow runner
//!
//! Command execution never happens on the tap thread. Serial workflows run
//! on one blocking task that checks a cancel token before each command;
//! concurrent workflows get one task per command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hotkey::{keycodes, KeyEvent};
use crate::workflow::{Command, Execution, KeyShortcut, Workflow};

use super::{CommandExecutor, WorkflowRunner};

/// Cooperative cancellation flag shared with a running task
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct TaskRunner {
    runtime: Handle,
    executor: Arc<dyn CommandExecutor>,
    /// Token of the most recent serial run
    current: Mutex<Option<CancelToken>>,
}

impl TaskRunner {
    pub fn new(runtime: Handle, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            runtime,
            executor,
            current: Mutex::new(None),
        }
    }

    /// Start running `workflow`, returning the spawned tasks
    pub fn spawn(
        &self,
        workflow: Arc<Workflow>,
        repeating: bool,
        execution_override: Option<Execution>,
    ) -> Vec<JoinHandle<()>> {
        let commands: Vec<Command> = workflow.enabled_commands().cloned().collect();
        if commands.is_empty() {
            debug!(workflow = %workflow.name, "no enabled commands");
            return Vec::new();
        }

        match execution_override.unwrap_or(workflow.execution) {
            Execution::Serial => {
                let token = CancelToken::new();
                if let Some(previous) = self.current.lock().replace(token.clone()) {
                    previous.cancel();
                }

                let check = checks_cancellation(&workflow);
                let executor = Arc::clone(&self.executor);
                let handle = self.runtime.spawn_blocking(move || {
                    let ran = run_serial(&commands, executor.as_ref(), &token, check, repeating);
                    debug!(workflow = %workflow.name, ran, total = commands.len(), "serial run finished");
                });
                vec![handle]
            }
            Execution::Concurrent => commands
                .into_iter()
                .map(|command| {
                    let executor = Arc::clone(&self.executor);
                    self.runtime.spawn_blocking(move || {
                        if let Err(e) = executor.execute(&command, repeating) {
                            warn!(command = command.kind_name(), %e, "command failed");
                        }
                    })
                })
                .collect(),
        }
    }
}

impl WorkflowRunner for TaskRunner {
    fn run(
        &self,
        workflow: &Arc<Workflow>,
        shortcut: &KeyShortcut,
        _event: &KeyEvent,
        repeating: bool,
        execution_override: Option<Execution>,
    ) {
        info!(workflow = %workflow.name, %shortcut, repeating, "running workflow");
        self.spawn(Arc::clone(workflow), repeating, execution_override);
    }
}

/// Escape-based passthrough triggers must always reach their command
fn checks_cancellation(workflow: &Workflow) -> bool {
    let Some(trigger) = workflow.keyboard_trigger() else {
        return true;
    };
    let escape_based = trigger
        .shortcuts
        .iter()
        .any(|shortcut| shortcut.key.eq_ignore_ascii_case(keycodes::ESCAPE_NAME));
    !(trigger.passthrough && escape_based)
}

/// Run commands in order, stopping early once `token` is cancelled.
/// Returns how many commands were attempted.
pub(crate) fn run_serial(
    commands: &[Command],
    executor: &dyn CommandExecutor,
    token: &CancelToken,
    check_cancellation: bool,
    repeating: bool,
) -> usize {
    let mut ran = 0;
    for command in commands {
        if check_cancellation && token.is_cancelled() {
            debug!(remaining = commands.len() - ran, "serial run cancelled");
            break;
        }
        if let Err(e) = executor.execute(command, repeating) {
            warn!(command = command.kind_name(), %e, "command failed");
        }
        ran += 1;
    }
    ran
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandError;
    use crate::workflow::{CommandMeta, KeyboardShortcutTrigger, Trigger};

    /// Cancels the token after the first command, like a newer run would
    struct CancellingExecutor {
        token: CancelToken,
        executed: Mutex<Vec<String>>,
    }

    impl CommandExecutor for CancellingExecutor {
        fn execute(&self, command: &Command, _repeating: bool) -> Result<(), CommandError> {
            self.executed.lock().push(command.meta().name.clone());
            self.token.cancel();
            Ok(())
        }
    }

    struct CountingExecutor(Mutex<usize>);

    impl CommandExecutor for CountingExecutor {
        fn execute(&self, _command: &Command, _repeating: bool) -> Result<(), CommandError> {
            *self.0.lock() += 1;
            Ok(())
        }
    }

    fn script(name: &str) -> Command {
        Command::Script {
            meta: CommandMeta {
                name: name.into(),
                ..CommandMeta::default()
            },
            source: "true".into(),
        }
    }

    #[test]
    fn test_serial_run_stops_after_cancel() {
        let token = CancelToken::new();
        let executor = CancellingExecutor {
            token: token.clone(),
            executed: Mutex::new(Vec::new()),
        };
        let commands = vec![script("one"), script("two"), script("three")];

        let ran = run_serial(&commands, &executor, &token, true, false);
        assert_eq!(ran, 1);
        assert_eq!(*executor.executed.lock(), vec!["one".to_string()]);
    }

    #[test]
    fn test_serial_run_without_checks_runs_everything() {
        let token = CancelToken::new();
        let executor = CancellingExecutor {
            token: token.clone(),
            executed: Mutex::new(Vec::new()),
        };
        let commands = vec![script("one"), script("two")];

        assert_eq!(run_serial(&commands, &executor, &token, false, false), 2);
    }

    #[test]
    fn test_escape_passthrough_disables_checks() {
        let mut workflow = Workflow::new("escape");
        workflow.trigger = Some(Trigger::KeyboardShortcuts(KeyboardShortcutTrigger {
            shortcuts: vec![KeyShortcut::new("Escape", [])],
            passthrough: true,
            hold_duration_ms: None,
        }));
        assert!(!checks_cancellation(&workflow));

        if let Some(Trigger::KeyboardShortcuts(trigger)) = workflow.trigger.as_mut() {
            trigger.passthrough = false;
        }
        assert!(checks_cancellation(&workflow));
    }

    #[tokio::test]
    async fn test_concurrent_runs_every_enabled_command() {
        let executor = Arc::new(CountingExecutor(Mutex::new(0)));
        let runner = TaskRunner::new(Handle::current(), executor.clone());

        let mut workflow = Workflow::new("parallel");
        workflow.execution = Execution::Concurrent;
        let mut disabled = script("off");
        if let Command::Script { meta, .. } = &mut disabled {
            meta.is_enabled = false;
        }
        workflow.commands = vec![script("a"), script("b"), disabled];

        let handles = runner.spawn(Arc::new(workflow), false, None);
        assert_eq!(handles.len(), 2);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*executor.0.lock(), 2);
    }

    #[tokio::test]
    async fn test_new_serial_run_cancels_previous_token() {
        let executor = Arc::new(CountingExecutor(Mutex::new(0)));
        let runner = TaskRunner::new(Handle::current(), executor.clone());

        let mut workflow = Workflow::new("serial");
        workflow.commands = vec![script("a")];
        let workflow = Arc::new(workflow);

        let first = runner.spawn(Arc::clone(&workflow), false, None);
        let first_token = runner.current.lock().clone().unwrap();
        let second = runner.spawn(workflow, false, None);

        assert!(first_token.is_cancelled());
        assert!(!runner.current.lock().as_ref().unwrap().is_cancelled());
        for handle in first.into_iter().chain(second) {
            handle.await.unwrap();
        }
    }
}
