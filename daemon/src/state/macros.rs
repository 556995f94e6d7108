//! Macro recording and playback
//!
//! A reserved toggle shortcut starts a recording. The next distinct shortcut
//! becomes the macro key, scoped to the frontmost application; everything
//! intercepted afterwards is appended until the toggle is pressed again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::hotkey::{EventSource, KeyCodeStore, KeyEvent, KeyEventKind, SyntheticEvent};
use crate::runner::{EventPoster, KeyboardCommandRunner, WorkflowRunner};
use crate::workflow::{Command, Execution, KeyShortcut, ShortcutCandidates, Workflow};

/// Pause around special keys during playback
pub const SETTLE_DELAY: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroState {
    #[default]
    Idle,
    Recording,
    Removing,
}

impl std::fmt::Display for MacroState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacroState::Idle => write!(f, "Idle"),
            MacroState::Recording => write!(f, "Recording"),
            MacroState::Removing => write!(f, "Removing"),
        }
    }
}

/// Where a macro is stored: per application, per shortcut
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroKey {
    pub bundle_identifier: String,
    pub shortcut_signature: String,
}

impl MacroKey {
    pub fn new(bundle_identifier: &str, shortcut: &KeyShortcut) -> Self {
        Self {
            bundle_identifier: bundle_identifier.to_string(),
            shortcut_signature: shortcut.signature(),
        }
    }
}

/// One recorded step
#[derive(Debug, Clone)]
pub enum MacroElement {
    Event(KeyEvent),
    Workflow {
        workflow: Arc<Workflow>,
        shortcut: KeyShortcut,
        event: KeyEvent,
    },
}

pub type Macro = Arc<Vec<MacroElement>>;

/// Result of pressing the toggle shortcut
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    Committed { key: MacroKey, elements: usize },
    /// Toggled off before a macro key was chosen
    Discarded,
    RemovalCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// Nothing stored; the user has to pick a macro key first
    MacroKeyRequired,
    NotRecording,
}

pub struct MacroCoordinator {
    state: MacroState,
    record_shortcut: KeyShortcut,
    recording_key: Option<MacroKey>,
    recording: Vec<MacroElement>,
    macros: HashMap<MacroKey, Macro>,
}

impl MacroCoordinator {
    pub fn new(record_shortcut: KeyShortcut) -> Self {
        Self {
            state: MacroState::Idle,
            record_shortcut,
            recording_key: None,
            recording: Vec::new(),
            macros: HashMap::new(),
        }
    }

    pub fn state(&self) -> MacroState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// The event is the reserved toggle shortcut
    pub fn is_toggle(&self, candidates: &ShortcutCandidates) -> bool {
        candidates.original == self.record_shortcut || candidates.uppercase == self.record_shortcut
    }

    /// Recording has started but no macro key was chosen yet
    pub fn needs_macro_key(&self) -> bool {
        self.state == MacroState::Recording && self.recording_key.is_none()
    }

    pub fn toggle(&mut self) -> ToggleOutcome {
        match self.state {
            MacroState::Idle => {
                self.start_recording();
                ToggleOutcome::Started
            }
            MacroState::Recording => {
                self.state = MacroState::Idle;
                let elements = std::mem::take(&mut self.recording);
                match self.recording_key.take() {
                    Some(key) => {
                        let count = elements.len();
                        info!(app = %key.bundle_identifier, shortcut = %key.shortcut_signature, elements = count, "macro recorded");
                        self.macros.insert(key.clone(), Arc::new(elements));
                        ToggleOutcome::Committed {
                            key,
                            elements: count,
                        }
                    }
                    None => ToggleOutcome::Discarded,
                }
            }
            MacroState::Removing => {
                self.state = MacroState::Idle;
                ToggleOutcome::RemovalCancelled
            }
        }
    }

    pub fn start_recording(&mut self) {
        self.state = MacroState::Recording;
        self.recording_key = None;
        self.recording.clear();
    }

    pub fn start_removal(&mut self) {
        self.recording_key = None;
        self.recording.clear();
        self.state = MacroState::Removing;
    }

    pub fn choose_key(&mut self, bundle_identifier: &str, shortcut: &KeyShortcut) -> MacroKey {
        let key = MacroKey::new(bundle_identifier, shortcut);
        debug!(app = %key.bundle_identifier, shortcut = %key.shortcut_signature, "macro key chosen");
        self.recording_key = Some(key.clone());
        key
    }

    pub fn record(&mut self, element: MacroElement) -> RecordOutcome {
        if self.state != MacroState::Recording {
            return RecordOutcome::NotRecording;
        }
        if self.recording_key.is_none() {
            return RecordOutcome::MacroKeyRequired;
        }
        self.recording.push(element);
        RecordOutcome::Recorded
    }

    pub fn match_macro(&self, bundle_identifier: &str, shortcut: &KeyShortcut) -> Option<Macro> {
        self.macros
            .get(&MacroKey::new(bundle_identifier, shortcut))
            .cloned()
    }

    /// While removing, delete the macro bound to `shortcut` and go idle
    pub fn remove(&mut self, bundle_identifier: &str, shortcut: &KeyShortcut) -> Option<MacroKey> {
        if self.state != MacroState::Removing {
            return None;
        }
        let key = MacroKey::new(bundle_identifier, shortcut);
        self.macros.remove(&key)?;
        self.state = MacroState::Idle;
        info!(app = %key.bundle_identifier, shortcut = %key.shortcut_signature, "macro removed");
        Some(key)
    }
}

/// Counters from one playback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub posted: usize,
    pub failed: usize,
    pub workflows: usize,
}

/// Replays recorded macros off the tap thread
#[derive(Clone)]
pub struct MacroPlayer {
    key_codes: Arc<dyn KeyCodeStore>,
    poster: Arc<dyn EventPoster>,
    keyboard: Arc<dyn KeyboardCommandRunner>,
    runner: Arc<dyn WorkflowRunner>,
}

impl MacroPlayer {
    pub fn new(
        key_codes: Arc<dyn KeyCodeStore>,
        poster: Arc<dyn EventPoster>,
        keyboard: Arc<dyn KeyboardCommandRunner>,
        runner: Arc<dyn WorkflowRunner>,
    ) -> Self {
        Self {
            key_codes,
            poster,
            keyboard,
            runner,
        }
    }

    pub async fn play(&self, elements: Macro, iterations: u32) -> PlaybackReport {
        let mut report = PlaybackReport::default();
        for _ in 0..iterations.max(1) {
            for element in elements.iter() {
                match element {
                    MacroElement::Event(event) => self.replay_event(event, &mut report).await,
                    MacroElement::Workflow {
                        workflow,
                        shortcut,
                        event,
                    } => {
                        self.replay_workflow(workflow, shortcut, event);
                        report.workflows += 1;
                    }
                }
            }
        }
        debug!(?report, "macro playback finished");
        report
    }

    async fn replay_event(&self, event: &KeyEvent, report: &mut PlaybackReport) {
        if event.kind != KeyEventKind::KeyDown {
            return;
        }
        let special = self.key_codes.special_keys().contains(&event.key_code);
        if special {
            tokio::time::sleep(SETTLE_DELAY).await;
        }
        for synthetic in SyntheticEvent::press(event.key_code, event.flags) {
            // Each failure is independent; keep going
            match self.poster.post(&synthetic, EventSource::Private) {
                Ok(()) => report.posted += 1,
                Err(e) => {
                    warn!(key_code = event.key_code, %e, "macro event failed to post");
                    report.failed += 1;
                }
            }
        }
        if special {
            tokio::time::sleep(SETTLE_DELAY).await;
        }
    }

    fn replay_workflow(&self, workflow: &Arc<Workflow>, shortcut: &KeyShortcut, event: &KeyEvent) {
        let mut commands = workflow.enabled_commands().peekable();
        let keyboard_only = commands.peek().is_some()
            && workflow
                .enabled_commands()
                .all(|command| matches!(command, Command::Keyboard { .. }));

        if keyboard_only {
            for command in commands {
                if let Command::Keyboard {
                    shortcuts,
                    iterations,
                    ..
                } = command
                {
                    for _ in 0..(*iterations).max(1) {
                        self.keyboard.run(shortcuts, None, false, EventSource::Private);
                    }
                }
            }
        } else {
            self.runner
                .run(workflow, shortcut, event, false, Some(Execution::Serial));
        }
    }
}
