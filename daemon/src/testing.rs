//! Recording test doubles for the coordinator's collaborators

use parking_lot::Mutex;

use crate::hotkey::{EventSource, KeyEvent, ModifierFlags, PostError, SyntheticEvent};
use crate::runner::{EventPoster, KeyboardCommandRunner, Notifier, WorkflowRunner};
use crate::workflow::{
    Command, CommandMeta, Execution, KeyShortcut, KeyboardShortcutTrigger, PartialMatch, Trigger,
    Workflow,
};

use std::sync::Arc;

/// Bind `workflow` to a keyboard shortcut sequence
pub fn bind(mut workflow: Workflow, shortcuts: Vec<KeyShortcut>) -> Workflow {
    workflow.trigger = Some(Trigger::KeyboardShortcuts(KeyboardShortcutTrigger {
        shortcuts,
        passthrough: false,
        hold_duration_ms: None,
    }));
    workflow
}

/// Workflow whose only command types `shortcuts`
pub fn keyboard_workflow(name: &str, shortcuts: Vec<KeyShortcut>) -> Workflow {
    let mut workflow = Workflow::new(name);
    workflow.commands = vec![Command::Keyboard {
        meta: CommandMeta::default(),
        shortcuts,
        iterations: 1,
    }];
    workflow
}

#[derive(Default)]
pub struct RecordingPoster {
    posted: Mutex<Vec<SyntheticEvent>>,
    failing_key_code: Option<u16>,
}

impl RecordingPoster {
    pub fn failing_on(key_code: u16) -> Self {
        Self {
            posted: Mutex::new(Vec::new()),
            failing_key_code: Some(key_code),
        }
    }

    pub fn posted(&self) -> Vec<SyntheticEvent> {
        self.posted.lock().clone()
    }
}

impl EventPoster for RecordingPoster {
    fn post(&self, event: &SyntheticEvent, _source: EventSource) -> Result<(), PostError> {
        if self.failing_key_code == Some(event.key_code) {
            return Err(PostError::EventCreation);
        }
        self.posted.lock().push(*event);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct KeyboardRun {
    pub shortcuts: Vec<String>,
    pub is_repeating: bool,
}

#[derive(Default)]
pub struct RecordingKeyboard {
    runs: Mutex<Vec<KeyboardRun>>,
}

impl RecordingKeyboard {
    pub fn runs(&self) -> Vec<KeyboardRun> {
        self.runs.lock().clone()
    }
}

impl KeyboardCommandRunner for RecordingKeyboard {
    fn run(
        &self,
        shortcuts: &[KeyShortcut],
        _original_event: Option<&KeyEvent>,
        is_repeating: bool,
        _source: EventSource,
    ) -> Vec<SyntheticEvent> {
        self.runs.lock().push(KeyboardRun {
            shortcuts: shortcuts.iter().map(KeyShortcut::signature).collect(),
            is_repeating,
        });
        shortcuts
            .iter()
            .flat_map(|_| SyntheticEvent::press(0, ModifierFlags::empty()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub workflow: String,
    pub shortcut: String,
    pub repeating: bool,
    pub execution_override: Option<Execution>,
}

#[derive(Default)]
pub struct RecordingRunner {
    runs: Mutex<Vec<WorkflowRun>>,
}

impl RecordingRunner {
    pub fn runs(&self) -> Vec<WorkflowRun> {
        self.runs.lock().clone()
    }
}

impl WorkflowRunner for RecordingRunner {
    fn run(
        &self,
        workflow: &Arc<Workflow>,
        shortcut: &KeyShortcut,
        _event: &KeyEvent,
        repeating: bool,
        execution_override: Option<Execution>,
    ) {
        self.runs.lock().push(WorkflowRun {
            workflow: workflow.name.clone(),
            shortcut: shortcut.signature(),
            repeating,
            execution_override,
        });
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    bundles: Mutex<usize>,
    keyboard_commands: Mutex<usize>,
    running: Mutex<usize>,
    resets: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn bundles(&self) -> usize {
        *self.bundles.lock()
    }

    pub fn keyboard_commands(&self) -> usize {
        *self.keyboard_commands.lock()
    }

    pub fn running(&self) -> usize {
        *self.running.lock()
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_bundles(&self, _partial_match: &PartialMatch) {
        *self.bundles.lock() += 1;
    }

    fn notify_keyboard_command(&self, _workflow: &Workflow, _command: &Command) {
        *self.keyboard_commands.lock() += 1;
    }

    fn notify_running_workflow(&self, _workflow: &Workflow) {
        *self.running.lock() += 1;
    }

    fn reset(&self) {
        *self.resets.lock() += 1;
    }
}
