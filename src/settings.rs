//! Controller configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            ansi_colors: default_true(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "camera_controller".to_string()
}

/// Connection and pairing behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Name pushed to the camera's device-name characteristic on connect.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Default scan duration in seconds when the caller does not pass one.
    #[serde(default = "default_scan_duration_secs")]
    pub scan_duration_secs: u64,

    /// Reconnect automatically after a link loss.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Minimum spacing between reconnect attempts, in seconds.
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Timeout for a single PIN entry, in seconds.
    #[serde(default = "default_pin_timeout_secs")]
    pub pin_timeout_secs: u64,

    /// Maximum PIN entry attempts before the bond is abandoned.
    #[serde(default = "default_pin_max_attempts")]
    pub pin_max_attempts: u32,

    /// Optional parameter cache cap for memory-constrained targets.
    #[serde(default)]
    pub parameter_capacity: Option<usize>,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            scan_duration_secs: default_scan_duration_secs(),
            auto_reconnect: default_true(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            pin_timeout_secs: default_pin_timeout_secs(),
            pin_max_attempts: default_pin_max_attempts(),
            parameter_capacity: None,
            log_settings: LogSettings::default(),
        }
    }
}

impl ControllerSettings {
    /// Default settings file location under the user config dir.
    pub fn default_path(app_name: &str) -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| Error::Storage("could not determine config directory".into()))?;
        path.push(app_name);
        fs::create_dir_all(&path).map_err(|e| Error::Storage(e.to_string()))?;
        path.push("settings.json");
        Ok(path)
    }

    /// Load settings from a JSON file, falling back to defaults when the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|e| Error::Storage(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| Error::Storage(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| Error::Storage(e.to_string()))?;
        fs::write(path, json).map_err(|e| Error::Storage(e.to_string()))
    }
}

fn default_device_name() -> String {
    "BLE Camera Controller".to_string()
}
fn default_scan_duration_secs() -> u64 {
    10
}
fn default_reconnect_interval_secs() -> u64 {
    5
}
fn default_pin_timeout_secs() -> u64 {
    30
}
fn default_pin_max_attempts() -> u32 {
    3
}
