//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::CoordinatorEvent;
use crate::state::{MacroState, Mode};

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Switch the coordinator mode
    SetMode { mode: Mode },

    /// Publish the frontmost application's bundle identifier
    SetFrontmostApplication { bundle_identifier: String },

    /// Publish the full set of enabled user modes
    SetUserModes { modes: Vec<String> },

    /// Capture the next key-down as a shortcut
    RecordKeystroke {
        #[serde(default)]
        allow_all_keys: bool,
    },

    RecordMacro,

    RemoveMacro,

    /// Iterations for the next macro playback
    SetRepeatCount { count: u32 },

    /// Re-read the workflows file
    ReloadWorkflows,

    /// Subscribe to coordinator event notifications
    Subscribe,
}

/// Messages from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Request applied
    Ok,

    Reloaded { workflows: usize },

    /// Subscription confirmed
    Subscribed,

    /// Pushed to subscribed clients
    Notification { event: CoordinatorEvent },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    pub mode: Mode,

    pub macro_state: MacroState,

    /// Whether the event tap is installed and enabled
    pub tap_enabled: bool,

    /// Indexed keyboard-triggered workflows
    pub workflows: usize,

    /// Recorded macros
    pub macros: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: Mode::default(),
            macro_state: MacroState::default(),
            tap_enabled: false,
            workflows: 0,
            macros: 0,
            uptime_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::SetMode {
            mode: Mode::RecordKeystroke,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("set_mode"));
        assert!(json.contains("record_keystroke"));
    }

    #[test]
    fn test_record_keystroke_defaults() {
        let req: Request = serde_json::from_str(r#"{"type":"record_keystroke"}"#).unwrap();
        assert!(matches!(req, Request::RecordKeystroke { allow_all_keys: false }));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("tap_enabled"));
    }

    #[test]
    fn test_notification_nests_event() {
        let resp = Response::Notification {
            event: CoordinatorEvent::MacroKeyRequired,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            json,
            r#"{"type":"notification","event":{"type":"macro_key_required"}}"#
        );
    }
}
