//! Workflow and shortcut data model
//!
//! These types are owned by configuration and are read-only to the
//! coordinator. They deserialize from the workflows file.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hotkey::ModifierKey;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn new_id() -> String {
    format!("kf-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

fn default_true() -> bool {
    true
}

fn default_iterations() -> u32 {
    1
}

/// A single key plus modifiers
///
/// Identity for matching is `(key, modifiers, lhs)`; `id` is bookkeeping only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyShortcut {
    #[serde(default = "new_id")]
    pub id: String,
    pub key: String,
    /// Modifiers were pressed with the left-hand keys
    #[serde(default = "default_true")]
    pub lhs: bool,
    #[serde(default)]
    pub modifiers: BTreeSet<ModifierKey>,
}

impl KeyShortcut {
    pub fn new(key: impl Into<String>, modifiers: impl IntoIterator<Item = ModifierKey>) -> Self {
        Self {
            id: new_id(),
            key: key.into(),
            lhs: true,
            modifiers: modifiers.into_iter().collect(),
        }
    }

    pub fn with_lhs(mut self, lhs: bool) -> Self {
        self.lhs = lhs;
        self
    }

    /// Stable string used as the resolver and macro key
    ///
    /// The side marker is only present when there are modifiers to place.
    pub fn signature(&self) -> String {
        let mut signature = String::new();
        for modifier in &self.modifiers {
            signature.push_str(&modifier.to_string());
            signature.push('+');
        }
        signature.push_str(&self.key);
        if !self.lhs && !self.modifiers.is_empty() {
            signature.push_str(":rhs");
        }
        signature
    }
}

impl PartialEq for KeyShortcut {
    fn eq(&self, other: &Self) -> bool {
        self.signature() == other.signature()
    }
}

impl Eq for KeyShortcut {}

impl fmt::Display for KeyShortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// How a workflow's commands are run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    #[default]
    Serial,
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyboardShortcutTrigger {
    pub shortcuts: Vec<KeyShortcut>,
    /// Forward the key to the focused application even when matched
    #[serde(default)]
    pub passthrough: bool,
    #[serde(default)]
    pub hold_duration_ms: Option<u64>,
}

impl KeyboardShortcutTrigger {
    /// Hold duration, only when the trigger is a single shortcut
    pub fn hold_duration(&self) -> Option<Duration> {
        match (self.hold_duration_ms, self.shortcuts.len()) {
            (Some(ms), 1) => Some(Duration::from_millis(ms)),
            _ => None,
        }
    }

    /// A hold duration is configured but cannot be honoured
    pub fn has_unusable_hold(&self) -> bool {
        self.hold_duration_ms.is_some() && self.shortcuts.len() != 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationEvent {
    Launched,
    Closed,
    Frontmost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationTrigger {
    pub bundle_identifier: String,
    #[serde(default)]
    pub events: Vec<ApplicationEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    KeyboardShortcuts(KeyboardShortcutTrigger),
    /// Handled outside the keyboard core
    Applications { applications: Vec<ApplicationTrigger> },
}

/// Gate on a user-toggleable mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserModeCondition {
    pub id: String,
    /// Required state of the mode
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMeta {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    /// Show a notification when the command runs
    #[serde(default)]
    pub notification: bool,
}

impl Default for CommandMeta {
    fn default() -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            is_enabled: true,
            notification: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemCommandKind {
    ActivateLastApplication,
    ApplicationWindows,
    MissionControl,
    ShowDesktop,
    MinimizeAllOpenWindows,
    HideAllApps,
    MoveFocusToNextWindow,
    MoveFocusToPreviousWindow,
    MoveFocusToNextWindowFront,
    MoveFocusToPreviousWindowFront,
    MoveFocusToNextWindowGlobal,
    MoveFocusToPreviousWindowGlobal,
    MoveFocusToNextWindowUpwards,
    MoveFocusToNextWindowDownwards,
    MoveFocusToNextWindowOnLeft,
    MoveFocusToNextWindowOnRight,
    WindowTilingLeft,
    WindowTilingRight,
    WindowTilingTop,
    WindowTilingBottom,
    WindowTilingTopLeft,
    WindowTilingTopRight,
    WindowTilingBottomLeft,
    WindowTilingBottomRight,
    WindowTilingCenter,
    WindowTilingFill,
    WindowTilingArrangeLeftRight,
    WindowTilingArrangeRightLeft,
    WindowTilingArrangeTopBottom,
    WindowTilingPreviousSize,
    WindowTilingZoom,
}

impl SystemCommandKind {
    pub fn is_window_focus(self) -> bool {
        use SystemCommandKind::*;
        matches!(
            self,
            MoveFocusToNextWindow
                | MoveFocusToPreviousWindow
                | MoveFocusToNextWindowFront
                | MoveFocusToPreviousWindowFront
                | MoveFocusToNextWindowGlobal
                | MoveFocusToPreviousWindowGlobal
                | MoveFocusToNextWindowUpwards
                | MoveFocusToNextWindowDownwards
                | MoveFocusToNextWindowOnLeft
                | MoveFocusToNextWindowOnRight
        )
    }

    pub fn is_window_tiling(self) -> bool {
        use SystemCommandKind::*;
        matches!(
            self,
            WindowTilingLeft
                | WindowTilingRight
                | WindowTilingTop
                | WindowTilingBottom
                | WindowTilingTopLeft
                | WindowTilingTopRight
                | WindowTilingBottomLeft
                | WindowTilingBottomRight
                | WindowTilingCenter
                | WindowTilingFill
                | WindowTilingArrangeLeftRight
                | WindowTilingArrangeRightLeft
                | WindowTilingArrangeTopBottom
                | WindowTilingPreviousSize
                | WindowTilingZoom
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationAction {
    #[default]
    Open,
    Close,
    Hide,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Keyboard {
        #[serde(flatten)]
        meta: CommandMeta,
        shortcuts: Vec<KeyShortcut>,
        #[serde(default = "default_iterations")]
        iterations: u32,
    },
    MenuBar {
        #[serde(flatten)]
        meta: CommandMeta,
        path: Vec<String>,
    },
    System {
        #[serde(flatten)]
        meta: CommandMeta,
        kind: SystemCommandKind,
    },
    Application {
        #[serde(flatten)]
        meta: CommandMeta,
        bundle_identifier: String,
        #[serde(default)]
        action: ApplicationAction,
    },
    Open {
        #[serde(flatten)]
        meta: CommandMeta,
        path: String,
    },
    Script {
        #[serde(flatten)]
        meta: CommandMeta,
        source: String,
    },
    Text {
        #[serde(flatten)]
        meta: CommandMeta,
        input: String,
    },
}

impl Command {
    pub fn meta(&self) -> &CommandMeta {
        match self {
            Command::Keyboard { meta, .. }
            | Command::MenuBar { meta, .. }
            | Command::System { meta, .. }
            | Command::Application { meta, .. }
            | Command::Open { meta, .. }
            | Command::Script { meta, .. }
            | Command::Text { meta, .. } => meta,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.meta().is_enabled
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Command::Keyboard { .. } => "keyboard",
            Command::MenuBar { .. } => "menu_bar",
            Command::System { .. } => "system",
            Command::Application { .. } => "application",
            Command::Open { .. } => "open",
            Command::Script { .. } => "script",
            Command::Text { .. } => "text",
        }
    }
}

/// Commands that can safely run again on every autorepeat
pub fn is_repeat_safe(command: &Command) -> bool {
    match command {
        Command::Keyboard { .. } | Command::MenuBar { .. } => true,
        Command::System { kind, .. } => kind.is_window_focus(),
        _ => false,
    }
}

/// Window tiling commands, collapsed into one dispatch per key press
pub fn is_window_tiling(command: &Command) -> bool {
    matches!(command, Command::System { kind, .. } if kind.is_window_tiling())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub execution: Execution,
    #[serde(default)]
    pub is_disabled: bool,
    /// Applications the workflow is scoped to; empty means global
    #[serde(default)]
    pub bundle_identifiers: Vec<String>,
    #[serde(default)]
    pub user_modes: Vec<UserModeCondition>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            trigger: None,
            commands: Vec::new(),
            execution: Execution::Serial,
            is_disabled: false,
            bundle_identifiers: Vec::new(),
            user_modes: Vec::new(),
        }
    }

    pub fn keyboard_trigger(&self) -> Option<&KeyboardShortcutTrigger> {
        match &self.trigger {
            Some(Trigger::KeyboardShortcuts(trigger)) => Some(trigger),
            _ => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.keyboard_trigger().is_some_and(|trigger| trigger.passthrough)
    }

    pub fn enabled_commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(|command| command.is_enabled())
    }

    /// Every user mode condition holds for the active modes
    pub fn satisfies_user_modes(&self, active: &HashSet<String>) -> bool {
        self.user_modes
            .iter()
            .all(|condition| active.contains(&condition.id) == condition.enabled)
    }
}
