//! Events module for coordinator notifications
//!
//! Everything the coordinator wants the outside world to know about is
//! published as a `CoordinatorEvent` on a broadcast channel. IPC
//! subscribers receive them as JSON.

use serde::{Deserialize, Serialize};

use crate::state::{KeystrokeRecording, MacroState, Mode};

/// Events emitted by the coordinator and its notifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    /// Coordinator mode changed
    ModeChanged { mode: Mode, previous: Mode },

    /// A keystroke was captured in record-keystroke mode
    KeystrokeRecorded { recording: KeystrokeRecording },

    MacroStateChanged { state: MacroState },

    /// The next shortcut became the key of the macro being recorded
    MacroKeyChosen {
        bundle_identifier: String,
        shortcut: String,
    },

    /// Input arrived during recording before a macro key was chosen
    MacroKeyRequired,

    MacroRecorded {
        bundle_identifier: String,
        shortcut: String,
        elements: usize,
    },

    MacroRemoved {
        bundle_identifier: String,
        shortcut: String,
    },

    MacroPlayed {
        bundle_identifier: String,
        shortcut: String,
        iterations: u32,
    },

    /// A sequence is in progress; UI may show what can follow
    BundlesMatched {
        raw_value: String,
        workflow: Option<String>,
    },

    KeyboardCommandRan { workflow: String, command: String },

    WorkflowRunning { workflow: String },

    /// Clear any sequence or command UI
    NotificationsReset,

    /// The OS disabled the event tap; it is being re-enabled
    TapDisabled,
}

impl std::fmt::Display for CoordinatorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorEvent::ModeChanged { mode, previous } => {
                write!(f, "MODE_CHANGED ({} -> {})", previous, mode)
            }
            CoordinatorEvent::KeystrokeRecorded { recording } => {
                write!(f, "KEYSTROKE_RECORDED ({})", recording)
            }
            CoordinatorEvent::MacroStateChanged { state } => {
                write!(f, "MACRO_STATE_CHANGED ({})", state)
            }
            CoordinatorEvent::MacroKeyChosen { shortcut, .. } => {
                write!(f, "MACRO_KEY_CHOSEN ({})", shortcut)
            }
            CoordinatorEvent::MacroKeyRequired => write!(f, "MACRO_KEY_REQUIRED"),
            CoordinatorEvent::MacroRecorded {
                shortcut, elements, ..
            } => write!(f, "MACRO_RECORDED ({}, {} elements)", shortcut, elements),
            CoordinatorEvent::MacroRemoved { shortcut, .. } => {
                write!(f, "MACRO_REMOVED ({})", shortcut)
            }
            CoordinatorEvent::MacroPlayed {
                shortcut,
                iterations,
                ..
            } => write!(f, "MACRO_PLAYED ({} x{})", shortcut, iterations),
            CoordinatorEvent::BundlesMatched { raw_value, .. } => {
                write!(f, "BUNDLES_MATCHED ({})", raw_value)
            }
            CoordinatorEvent::KeyboardCommandRan { workflow, command } => {
                write!(f, "KEYBOARD_COMMAND_RAN ({}: {})", workflow, command)
            }
            CoordinatorEvent::WorkflowRunning { workflow } => {
                write!(f, "WORKFLOW_RUNNING ({})", workflow)
            }
            CoordinatorEvent::NotificationsReset => write!(f, "NOTIFICATIONS_RESET"),
            CoordinatorEvent::TapDisabled => write!(f, "TAP_DISABLED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CoordinatorEvent::ModeChanged {
            mode: Mode::RecordMacro,
            previous: Mode::Intercept,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("mode_changed"));
        assert!(json.contains("record_macro"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"workflow_running","workflow":"deploy"}"#;
        let event: CoordinatorEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, CoordinatorEvent::WorkflowRunning { workflow } if workflow == "deploy"));
    }

    #[test]
    fn test_display() {
        let event = CoordinatorEvent::MacroPlayed {
            bundle_identifier: "com.apple.Notes".into(),
            shortcut: "1".into(),
            iterations: 3,
        };
        assert_eq!(event.to_string(), "MACRO_PLAYED (1 x3)");
    }
}
