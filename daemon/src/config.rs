//! Configuration loading and management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::hotkey::ModifierKey;
use crate::runner::NotificationPreferences;
use crate::workflow::{KeyShortcut, Workflow};

/// Errors from loading settings or workflows
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("HOME is not set")]
    NoHome,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// User settings, read from `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Which notifications reach the UI
    pub notifications: NotificationPreferences,

    /// Reserved shortcut that toggles macro recording
    pub macro_record_shortcut: KeyShortcut,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications: NotificationPreferences::default(),
            macro_record_shortcut: KeyShortcut::new(
                "M",
                [ModifierKey::Control, ModifierKey::Option, ModifierKey::Command],
            ),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// JSON array of workflows
    pub workflows_path: PathBuf,

    pub settings: Settings,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
        let mut config = Self::with_data_dir(
            PathBuf::from(&home)
                .join(".local")
                .join("share")
                .join("keyflow"),
        )?;

        if let Ok(socket) = std::env::var("KEYFLOW_SOCKET") {
            config.socket_path = PathBuf::from(socket);
        }
        if let Ok(workflows) = std::env::var("KEYFLOW_WORKFLOWS") {
            config.workflows_path = PathBuf::from(workflows);
        }
        Ok(config)
    }

    /// Defaults rooted at `data_dir`, plus `settings.json` if present
    pub fn with_data_dir(data_dir: PathBuf) -> Result<Self, ConfigError> {
        let settings_path = data_dir.join("settings.json");
        let settings = if settings_path.exists() {
            read_json(&settings_path)?
        } else {
            debug!(?settings_path, "no settings file, using defaults");
            Settings::default()
        };

        Ok(Self {
            socket_path: data_dir.join("daemon.sock"),
            workflows_path: data_dir.join("workflows.json"),
            data_dir,
            settings,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|source| ConfigError::Read {
            path: self.data_dir.clone(),
            source,
        })
    }

    pub fn load_workflows(&self) -> Result<Vec<Workflow>, ConfigError> {
        load_workflows(&self.workflows_path)
    }
}

/// Read workflows from `path`; a missing file is an empty configuration
pub fn load_workflows(path: &Path) -> Result<Vec<Workflow>, ConfigError> {
    if !path.exists() {
        info!(?path, "no workflows file, starting empty");
        return Ok(Vec::new());
    }
    let workflows: Vec<Workflow> = read_json(path)?;
    info!(count = workflows.len(), ?path, "workflows loaded");
    Ok(workflows)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keyflow-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = scratch_dir("defaults");
        let config = Config::with_data_dir(dir.clone()).unwrap();
        assert_eq!(config.socket_path, dir.join("daemon.sock"));
        assert_eq!(
            config.settings.macro_record_shortcut.signature(),
            "Ctrl+Opt+Cmd+M"
        );
        assert!(config.settings.notifications.bundles);
        assert!(config.load_workflows().unwrap().is_empty());
    }

    #[test]
    fn test_settings_and_workflows_are_read() {
        let dir = scratch_dir("files");
        std::fs::write(
            dir.join("settings.json"),
            r#"{"notifications": {"running_workflows": true}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("workflows.json"),
            r#"[{"name": "W", "trigger": {"type": "keyboard_shortcuts", "shortcuts": [{"key": "K"}]}}]"#,
        )
        .unwrap();

        let config = Config::with_data_dir(dir).unwrap();
        assert!(config.settings.notifications.running_workflows);
        // Unspecified settings keep their defaults
        assert!(config.settings.notifications.bundles);
        let workflows = config.load_workflows().unwrap();
        assert_eq!(workflows.len(), 1);
        assert_eq!(workflows[0].name, "W");
    }

    #[test]
    fn test_malformed_workflows_report_path() {
        let dir = scratch_dir("malformed");
        let path = dir.join("workflows.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_workflows(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("workflows.json"));
    }
}
