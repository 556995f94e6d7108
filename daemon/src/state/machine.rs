//! Event coordinator
//!
//! Receives every raw event from the tap and decides, synchronously, whether
//! it is suppressed. All mutable state lives in one struct behind a single
//! mutex; the tap delivers serially, so the lock is uncontended except for
//! a hold timer firing. Command execution is always handed off to the
//! workflow runner.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::events::CoordinatorEvent;
use crate::hotkey::{keycodes, EventSource, KeyCodeStore, KeyEvent, KeyEventKind, TapDecision};
use crate::runner::{EventPoster, KeyboardCommandRunner, Notifier, WorkflowRunner};
use crate::workflow::{
    is_repeat_safe, is_window_tiling, normalize, Command, KeyShortcut, LookupResult, PartialMatch,
    ShortcutCandidates, ShortcutResolver, Workflow,
};

use super::hold::HoldScheduler;
use super::macros::{MacroCoordinator, MacroElement, MacroPlayer, MacroState, RecordOutcome, ToggleOutcome};
use super::repeat::{DispatchFn, RepeatCache};

/// Which branch of the coordinator runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Disabled,
    #[default]
    Intercept,
    RecordKeystroke,
    RecordMacro,
    CaptureUiElement,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Disabled => write!(f, "Disabled"),
            Mode::Intercept => write!(f, "Intercept"),
            Mode::RecordKeystroke => write!(f, "RecordKeystroke"),
            Mode::RecordMacro => write!(f, "RecordMacro"),
            Mode::CaptureUiElement => write!(f, "CaptureUiElement"),
        }
    }
}

/// Outcome of record-keystroke mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "shortcut", rename_all = "snake_case")]
pub enum KeystrokeRecording {
    Valid(KeyShortcut),
    /// Backspace or forward delete: remove the previously recorded shortcut
    Delete(KeyShortcut),
    /// Escape: abandon recording
    Cancel(KeyShortcut),
}

impl std::fmt::Display for KeystrokeRecording {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeystrokeRecording::Valid(shortcut) => write!(f, "valid {}", shortcut),
            KeystrokeRecording::Delete(shortcut) => write!(f, "delete {}", shortcut),
            KeystrokeRecording::Cancel(shortcut) => write!(f, "cancel {}", shortcut),
        }
    }
}

/// External collaborators, injected at construction
#[derive(Clone)]
pub struct Collaborators {
    pub runner: Arc<dyn WorkflowRunner>,
    pub keyboard: Arc<dyn KeyboardCommandRunner>,
    pub notifier: Arc<dyn Notifier>,
    pub key_codes: Arc<dyn KeyCodeStore>,
    pub poster: Arc<dyn EventPoster>,
}

/// Values published asynchronously and read on the event path
#[derive(Debug, Default)]
pub struct Inputs {
    frontmost_application: ArcSwap<String>,
    user_modes: ArcSwap<HashSet<String>>,
    repeat_count: AtomicU32,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frontmost_application(&self) -> Arc<String> {
        self.frontmost_application.load_full()
    }

    pub fn set_frontmost_application(&self, bundle_identifier: impl Into<String>) {
        self.frontmost_application.store(Arc::new(bundle_identifier.into()));
    }

    pub fn user_modes(&self) -> Arc<HashSet<String>> {
        self.user_modes.load_full()
    }

    pub fn set_user_modes(&self, modes: HashSet<String>) {
        self.user_modes.store(Arc::new(modes));
    }

    pub fn set_repeat_count(&self, count: u32) {
        self.repeat_count.store(count, Ordering::SeqCst);
    }

    /// Consume the pending repeat count; unset means one iteration
    pub fn take_repeat_count(&self) -> u32 {
        self.repeat_count.swap(0, Ordering::SeqCst).max(1)
    }
}

/// Snapshot for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub mode: Mode,
    pub macro_state: MacroState,
    pub workflows: usize,
    pub macros: usize,
    pub partial_match: String,
}

/// Tiling command waiting for its key-up
struct PendingTiling {
    key_code: u16,
    workflow: Arc<Workflow>,
    shortcut: KeyShortcut,
    event: KeyEvent,
}

struct CoordinatorState {
    mode: Mode,
    allow_all_keys: bool,
    resolver: ShortcutResolver,
    partial: PartialMatch,
    repeat: RepeatCache,
    hold: HoldScheduler,
    macros: MacroCoordinator,
    pending_tiling: Option<PendingTiling>,
    /// Keys whose key-down was suppressed; their key-up is suppressed too
    suppressed_keys: HashSet<u16>,
}

impl CoordinatorState {
    fn reset_transient(&mut self) {
        self.partial = PartialMatch::default();
        self.repeat.invalidate();
        self.hold.cancel();
        self.pending_tiling = None;
    }
}

#[derive(Clone)]
pub struct EventCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    collaborators: Collaborators,
    inputs: Arc<Inputs>,
    player: MacroPlayer,
    event_tx: broadcast::Sender<CoordinatorEvent>,
    runtime: Handle,
}

impl EventCoordinator {
    pub fn new(
        workflows: &[Workflow],
        macro_record_shortcut: KeyShortcut,
        collaborators: Collaborators,
        inputs: Arc<Inputs>,
        event_tx: broadcast::Sender<CoordinatorEvent>,
        runtime: Handle,
    ) -> Self {
        let state = CoordinatorState {
            mode: Mode::Intercept,
            allow_all_keys: false,
            resolver: ShortcutResolver::new(workflows),
            partial: PartialMatch::default(),
            repeat: RepeatCache::new(),
            hold: HoldScheduler::new(runtime.clone()),
            macros: MacroCoordinator::new(macro_record_shortcut),
            pending_tiling: None,
            suppressed_keys: HashSet::new(),
        };
        let player = MacroPlayer::new(
            Arc::clone(&collaborators.key_codes),
            Arc::clone(&collaborators.poster),
            Arc::clone(&collaborators.keyboard),
            Arc::clone(&collaborators.runner),
        );

        Self {
            state: Arc::new(Mutex::new(state)),
            collaborators,
            inputs,
            player,
            event_tx,
            runtime,
        }
    }

    pub fn inputs(&self) -> &Arc<Inputs> {
        &self.inputs
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    pub fn status(&self) -> CoordinatorStatus {
        let state = self.state.lock();
        CoordinatorStatus {
            mode: state.mode,
            macro_state: state.macros.state(),
            workflows: state.resolver.len(),
            macros: state.macros.len(),
            partial_match: state.partial.raw_value.clone(),
        }
    }

    pub fn set_mode(&self, mode: Mode) {
        let mut state = self.state.lock();
        self.transition_to(&mut state, mode);
    }

    /// Capture the next key-down as a shortcut instead of resolving it
    pub fn start_keystroke_recording(&self, allow_all_keys: bool) {
        let mut state = self.state.lock();
        state.allow_all_keys = allow_all_keys;
        self.transition_to(&mut state, Mode::RecordKeystroke);
    }

    pub fn start_macro_recording(&self) {
        let mut state = self.state.lock();
        state.macros.start_recording();
        self.emit(CoordinatorEvent::MacroStateChanged {
            state: MacroState::Recording,
        });
        self.transition_to(&mut state, Mode::RecordMacro);
    }

    pub fn start_macro_removal(&self) {
        let mut state = self.state.lock();
        state.macros.start_removal();
        self.emit(CoordinatorEvent::MacroStateChanged {
            state: MacroState::Removing,
        });
        self.transition_to(&mut state, Mode::RecordMacro);
    }

    /// Swap in a new workflow configuration
    pub fn reload(&self, workflows: &[Workflow]) {
        let mut state = self.state.lock();
        state.resolver = ShortcutResolver::new(workflows);
        state.reset_transient();
        info!(workflows = state.resolver.len(), "workflows reloaded");
    }

    /// Process one event from the tap
    pub fn handle(&self, event: &KeyEvent) -> TapDecision {
        let mut state = self.state.lock();
        let decision = match state.mode {
            Mode::Disabled | Mode::CaptureUiElement => match event.kind {
                KeyEventKind::KeyUp => release(&mut state, event.key_code),
                _ => TapDecision::Forward,
            },
            Mode::RecordKeystroke => self.record_keystroke(&mut state, event),
            Mode::Intercept | Mode::RecordMacro => match event.kind {
                KeyEventKind::MouseButton => TapDecision::Forward,
                KeyEventKind::FlagsChanged => {
                    state.repeat.invalidate();
                    TapDecision::Forward
                }
                KeyEventKind::KeyUp => self.key_up(&mut state, event),
                KeyEventKind::KeyDown => self.key_down(&mut state, event),
            },
        };

        // A delivered key-down must get its key-up delivered too
        if event.kind == KeyEventKind::KeyDown && decision == TapDecision::Forward {
            state.suppressed_keys.remove(&event.key_code);
        }
        decision
    }

    fn transition_to(&self, state: &mut CoordinatorState, mode: Mode) {
        let previous = state.mode;
        if previous == mode {
            return;
        }
        info!(from = %previous, to = %mode, "mode transition");
        state.mode = mode;
        state.reset_transient();
        self.emit(CoordinatorEvent::ModeChanged { mode, previous });
    }

    fn emit(&self, event: CoordinatorEvent) {
        debug!(%event, "emitting coordinator event");
        let _ = self.event_tx.send(event);
    }

    fn record_keystroke(&self, state: &mut CoordinatorState, event: &KeyEvent) -> TapDecision {
        match event.kind {
            KeyEventKind::KeyDown => {}
            KeyEventKind::KeyUp => return release(state, event.key_code),
            _ => return TapDecision::Forward,
        }
        let Some(candidates) = normalize(event, self.collaborators.key_codes.as_ref()) else {
            return TapDecision::Forward;
        };

        let typed = &candidates.uppercase;
        let shortcut = KeyShortcut::new(typed.key.clone(), typed.modifiers.iter().copied())
            .with_lhs(typed.lhs);
        let recording = if state.allow_all_keys {
            KeystrokeRecording::Valid(shortcut)
        } else {
            match event.key_code {
                keycodes::BACKSPACE | keycodes::FORWARD_DELETE => KeystrokeRecording::Delete(shortcut),
                keycodes::ESCAPE => KeystrokeRecording::Cancel(shortcut),
                _ => KeystrokeRecording::Valid(shortcut),
            }
        };

        state.allow_all_keys = false;
        self.transition_to(state, Mode::Intercept);
        self.emit(CoordinatorEvent::KeystrokeRecorded { recording });
        suppress(state, event.key_code)
    }

    fn key_up(&self, state: &mut CoordinatorState, event: &KeyEvent) -> TapDecision {
        state.hold.cancel_for(event.key_code);
        state.repeat.invalidate();

        let released = state
            .pending_tiling
            .as_ref()
            .is_some_and(|pending| pending.key_code == event.key_code);
        if released {
            if let Some(pending) = state.pending_tiling.take() {
                trace!(workflow = %pending.workflow.name, "dispatching tiling on key-up");
                self.collaborators.notifier.notify_running_workflow(&pending.workflow);
                self.collaborators.runner.run(
                    &pending.workflow,
                    &pending.shortcut,
                    &pending.event,
                    false,
                    None,
                );
            }
        }

        release(state, event.key_code)
    }

    fn key_down(&self, state: &mut CoordinatorState, event: &KeyEvent) -> TapDecision {
        let Some(candidates) = normalize(event, self.collaborators.key_codes.as_ref()) else {
            return TapDecision::Forward;
        };
        let bundle = self.inputs.frontmost_application();

        if let Some(decision) = self.handle_macros(state, event, &candidates, &bundle) {
            return decision;
        }

        // Escape only cancels an in-progress sequence when pressed bare
        if event.key_code == keycodes::ESCAPE
            && !state.partial.is_default()
            && !event.flags.has_modifiers()
        {
            debug!(partial = %state.partial.raw_value, "sequence cancelled");
            state.partial = PartialMatch::default();
            self.collaborators.notifier.reset();
            return suppress(state, event.key_code);
        }

        if let Some(cached) = state.repeat.should_reuse(event) {
            if let Some(dispatch) = &cached.dispatch {
                dispatch(event, true);
            }
            return cached.decision;
        }
        if state.repeat.should_skip(event) {
            // The application sees every repeat, so the macro does too
            if state.macros.state() == MacroState::Recording {
                self.record_macro_element(state, MacroElement::Event(event.clone()));
            }
            return TapDecision::Forward;
        }

        let user_modes = self.inputs.user_modes();
        let previous = state.partial.clone();
        let (result, shortcut) =
            resolve(&state.resolver, &candidates, &bundle, &user_modes, &previous);

        match result {
            LookupResult::None => {
                trace!(shortcut = %candidates.original, "no match");
                if !previous.is_default() {
                    self.collaborators.notifier.reset();
                }
                state.partial = PartialMatch::default();
                state.repeat.record_miss(event.key_code);
                if state.macros.state() == MacroState::Recording {
                    self.record_macro_element(state, MacroElement::Event(event.clone()));
                }
                TapDecision::Forward
            }
            LookupResult::PartialMatch(partial) => {
                debug!(partial = %partial.raw_value, "partial match");
                let passthrough = partial
                    .workflow
                    .as_ref()
                    .is_some_and(|workflow| workflow.is_passthrough());
                self.collaborators.notifier.notify_bundles(&partial);
                state.partial = partial;

                let decision = if passthrough {
                    TapDecision::Forward
                } else {
                    suppress(state, event.key_code)
                };
                state.repeat.store(event.key_code, None, decision);
                decision
            }
            LookupResult::Exact(workflow) => {
                debug!(workflow = %workflow.name, %shortcut, "exact match");
                if !previous.is_default() {
                    self.collaborators.notifier.reset();
                }
                state.partial = PartialMatch::default();
                if state.macros.state() == MacroState::Recording {
                    self.record_macro_element(
                        state,
                        MacroElement::Workflow {
                            workflow: Arc::clone(&workflow),
                            shortcut: shortcut.clone(),
                            event: event.clone(),
                        },
                    );
                }

                let decision = if workflow.is_passthrough() {
                    TapDecision::Forward
                } else {
                    suppress(state, event.key_code)
                };
                self.dispatch(state, workflow, shortcut, event, decision);
                decision
            }
        }
    }

    /// Macro toggle, key selection, removal and playback. `Some` means the
    /// event was consumed.
    fn handle_macros(
        &self,
        state: &mut CoordinatorState,
        event: &KeyEvent,
        candidates: &ShortcutCandidates,
        bundle: &str,
    ) -> Option<TapDecision> {
        if state.macros.is_toggle(candidates) {
            if !event.is_autorepeat {
                self.toggle_macro(state);
            }
            return Some(suppress(state, event.key_code));
        }

        match state.macros.state() {
            MacroState::Recording if state.macros.needs_macro_key() => {
                if event.is_autorepeat {
                    return Some(suppress(state, event.key_code));
                }
                let key = state.macros.choose_key(bundle, &candidates.original);
                self.emit(CoordinatorEvent::MacroKeyChosen {
                    bundle_identifier: key.bundle_identifier,
                    shortcut: key.shortcut_signature,
                });
                Some(suppress(state, event.key_code))
            }
            MacroState::Removing => {
                let key = state.macros.remove(bundle, &candidates.original)?;
                self.emit(CoordinatorEvent::MacroRemoved {
                    bundle_identifier: key.bundle_identifier,
                    shortcut: key.shortcut_signature,
                });
                self.emit(CoordinatorEvent::MacroStateChanged {
                    state: MacroState::Idle,
                });
                self.transition_to(state, Mode::Intercept);
                Some(suppress(state, event.key_code))
            }
            MacroState::Idle
                if state.mode == Mode::Intercept
                    && !event.is_autorepeat
                    && state.partial.is_default() =>
            {
                let recorded = state.macros.match_macro(bundle, &candidates.original)?;
                let iterations = self.inputs.take_repeat_count();
                info!(app = %bundle, shortcut = %candidates.original, iterations, "playing macro");

                let player = self.player.clone();
                self.runtime.spawn(async move {
                    player.play(recorded, iterations).await;
                });
                self.emit(CoordinatorEvent::MacroPlayed {
                    bundle_identifier: bundle.to_string(),
                    shortcut: candidates.original.signature(),
                    iterations,
                });
                Some(suppress(state, event.key_code))
            }
            _ => None,
        }
    }

    fn toggle_macro(&self, state: &mut CoordinatorState) {
        match state.macros.toggle() {
            ToggleOutcome::Started => {
                self.emit(CoordinatorEvent::MacroStateChanged {
                    state: MacroState::Recording,
                });
                self.transition_to(state, Mode::RecordMacro);
            }
            outcome => {
                if let ToggleOutcome::Committed { key, elements } = outcome {
                    self.emit(CoordinatorEvent::MacroRecorded {
                        bundle_identifier: key.bundle_identifier,
                        shortcut: key.shortcut_signature,
                        elements,
                    });
                }
                self.emit(CoordinatorEvent::MacroStateChanged {
                    state: MacroState::Idle,
                });
                self.transition_to(state, Mode::Intercept);
            }
        }
    }

    fn record_macro_element(&self, state: &mut CoordinatorState, element: MacroElement) {
        if state.macros.record(element) == RecordOutcome::MacroKeyRequired {
            self.emit(CoordinatorEvent::MacroKeyRequired);
        }
    }

    fn dispatch(
        &self,
        state: &mut CoordinatorState,
        workflow: Arc<Workflow>,
        shortcut: KeyShortcut,
        event: &KeyEvent,
        decision: TapDecision,
    ) {
        let key_code = event.key_code;

        if let Some(trigger) = workflow.keyboard_trigger() {
            if let Some(duration) = trigger.hold_duration() {
                self.schedule_hold(state, workflow, shortcut, event, duration);
                state.repeat.store(key_code, None, decision);
                return;
            }
            if trigger.has_unusable_hold() {
                warn!(workflow = %workflow.name, "hold duration needs a single shortcut, dispatching immediately");
            }
        }

        let commands: Vec<&Command> = workflow.enabled_commands().collect();
        let repeating = event.is_autorepeat;

        // Single keyboard command: post directly, bypassing runner cancellation
        if let [command] = commands.as_slice() {
            if let Command::Keyboard {
                shortcuts,
                iterations,
                ..
            } = *command
            {
                let keyboard = Arc::clone(&self.collaborators.keyboard);
                let shortcuts = shortcuts.clone();
                let iterations = (*iterations).max(1);
                for _ in 0..iterations {
                    keyboard.run(&shortcuts, Some(event), repeating, EventSource::Private);
                }
                self.collaborators.notifier.notify_keyboard_command(&workflow, command);

                let replay: DispatchFn = Arc::new(move |event: &KeyEvent, repeating: bool| {
                    for _ in 0..iterations {
                        keyboard.run(&shortcuts, Some(event), repeating, EventSource::Private);
                    }
                });
                state.repeat.store(key_code, Some(replay), decision);
                return;
            }
        }

        let repeat_safe = !commands.is_empty() && commands.iter().all(|command| is_repeat_safe(command));
        let tiling_only = !commands.is_empty() && commands.iter().all(|command| is_window_tiling(command));

        if repeat_safe {
            self.collaborators.notifier.notify_running_workflow(&workflow);
            self.collaborators
                .runner
                .run(&workflow, &shortcut, event, repeating, None);

            let runner = Arc::clone(&self.collaborators.runner);
            let replay: DispatchFn = Arc::new(move |event: &KeyEvent, repeating: bool| {
                runner.run(&workflow, &shortcut, event, repeating, None);
            });
            state.repeat.store(key_code, Some(replay), decision);
            return;
        }

        if tiling_only {
            trace!(workflow = %workflow.name, "tiling deferred to key-up");
            state.pending_tiling = Some(PendingTiling {
                key_code,
                workflow,
                shortcut,
                event: event.clone(),
            });
            state.repeat.store(key_code, None, decision);
            return;
        }

        if !repeating {
            self.collaborators.notifier.notify_running_workflow(&workflow);
            self.collaborators
                .runner
                .run(&workflow, &shortcut, event, false, None);
        }
        state.repeat.store(key_code, None, decision);
    }

    fn schedule_hold(
        &self,
        state: &mut CoordinatorState,
        workflow: Arc<Workflow>,
        shortcut: KeyShortcut,
        event: &KeyEvent,
        duration: std::time::Duration,
    ) {
        debug!(workflow = %workflow.name, duration_ms = duration.as_millis() as u64, "scheduling hold");
        let shared = Arc::downgrade(&self.state);
        let runner = Arc::clone(&self.collaborators.runner);
        let notifier = Arc::clone(&self.collaborators.notifier);
        let event = event.clone();

        state.hold.schedule(event.key_code, duration, move || {
            if let Some(state) = shared.upgrade() {
                state.lock().partial = PartialMatch::default();
            }
            notifier.notify_running_workflow(&workflow);
            runner.run(&workflow, &shortcut, &event, false, None);
        });
    }
}

fn suppress(state: &mut CoordinatorState, key_code: u16) -> TapDecision {
    state.suppressed_keys.insert(key_code);
    TapDecision::Suppress
}

fn release(state: &mut CoordinatorState, key_code: u16) -> TapDecision {
    if state.suppressed_keys.remove(&key_code) {
        TapDecision::Suppress
    } else {
        TapDecision::Forward
    }
}

/// Try the candidates in order, then retry once as a fresh sequence start
/// when an in-progress prefix led nowhere.
fn resolve(
    resolver: &ShortcutResolver,
    candidates: &ShortcutCandidates,
    bundle: &str,
    user_modes: &HashSet<String>,
    previous: &PartialMatch,
) -> (LookupResult, KeyShortcut) {
    let agnostic_uppercase;
    let mut attempts = vec![&candidates.original, &candidates.uppercase];
    // Agnostic matching only continues a sequence already in progress
    if !previous.is_default() {
        agnostic_uppercase = KeyShortcut {
            key: candidates.uppercase.key.clone(),
            ..candidates.lhs_agnostic.clone()
        };
        attempts.push(&candidates.lhs_agnostic);
        attempts.push(&agnostic_uppercase);
    }
    for shortcut in attempts {
        let result = resolver.lookup(shortcut, bundle, user_modes, previous);
        if !result.is_none() {
            return (result, shortcut.clone());
        }
    }

    if !previous.is_default() {
        let fresh = PartialMatch::default();
        for shortcut in [&candidates.original, &candidates.uppercase] {
            let result = resolver.lookup(shortcut, bundle, user_modes, &fresh);
            if !result.is_none() {
                return (result, shortcut.clone());
            }
        }
    }

    (LookupResult::None, candidates.original.clone())
}
