//! Driver configuration.
//!
//! Plain scalars consumed by the core; loaded from a JSON file with
//! per-field defaults so a partial (or absent) file still yields a working
//! setup. No global config instance: the loaded value is handed to the
//! `Controller` at assembly time.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverConfig {
    /// Target device identity (`host:port` or a pre-connected alias).
    /// `None` means discover: live devices first, then the candidate list.
    #[serde(default)]
    pub device_id: Option<String>,

    /// Path to the adb binary.
    #[serde(default = "default_adb_path")]
    pub adb_path: String,

    /// Minimum interval between dispatched input actions, in milliseconds.
    /// Floor-clamped to 50 ms by the dispatcher.
    #[serde(default = "default_min_input_interval_ms")]
    pub min_input_interval_ms: u64,

    /// Default template-match threshold.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    /// Default `wait_for` deadline, in seconds.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Default `wait_for` poll interval, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Well-known local emulator endpoints tried in order when no device
    /// is reachable. MuMu12 first, then Ld/Nox/MEmu defaults.
    #[serde(default = "default_connect_candidates")]
    pub connect_candidates: Vec<String>,

    /// Per-command adb timeout, in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Task retry attempts.
    #[serde(default = "default_task_attempts")]
    pub task_attempts: u32,

    /// Fixed delay between task attempts, in seconds.
    #[serde(default = "default_task_retry_delay_secs")]
    pub task_retry_delay_secs: u64,
}

fn default_adb_path() -> String {
    "adb".to_string()
}
fn default_min_input_interval_ms() -> u64 {
    100
}
fn default_match_threshold() -> f64 {
    0.8
}
fn default_wait_timeout_secs() -> u64 {
    10
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_connect_candidates() -> Vec<String> {
    [
        "127.0.0.1:16384", // MuMu12
        "127.0.0.1:7555",  // MuMu12 fallback
        "127.0.0.1:5555",  // LDPlayer
        "127.0.0.1:62001", // Nox
        "127.0.0.1:21503", // MEmu
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_command_timeout_secs() -> u64 {
    10
}
fn default_task_attempts() -> u32 {
    3
}
fn default_task_retry_delay_secs() -> u64 {
    2
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            adb_path: default_adb_path(),
            min_input_interval_ms: default_min_input_interval_ms(),
            match_threshold: default_match_threshold(),
            wait_timeout_secs: default_wait_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            connect_candidates: default_connect_candidates(),
            command_timeout_secs: default_command_timeout_secs(),
            task_attempts: default_task_attempts(),
            task_retry_delay_secs: default_task_retry_delay_secs(),
        }
    }
}

impl DriverConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg = serde_json::from_str(&content)?;
                tracing::info!("config loaded from {}", path.display());
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment overrides (`DROIDPILOT_DEVICE`, `DROIDPILOT_ADB`).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = env::var("DROIDPILOT_DEVICE") {
            if !device.is_empty() {
                self.device_id = Some(device);
            }
        }
        if let Ok(adb) = env::var("DROIDPILOT_ADB") {
            if !adb.is_empty() {
                self.adb_path = adb;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = DriverConfig::default();
        assert_eq!(cfg.min_input_interval_ms, 100);
        assert_eq!(cfg.match_threshold, 0.8);
        assert_eq!(cfg.connect_candidates[0], "127.0.0.1:16384");
        assert!(cfg.device_id.is_none());
    }

    #[test]
    fn test_partial_json_uses_field_defaults() {
        let cfg: DriverConfig =
            serde_json::from_str(r#"{"device_id": "127.0.0.1:7555", "task_attempts": 5}"#)
                .expect("deserialize");
        assert_eq!(cfg.device_id.as_deref(), Some("127.0.0.1:7555"));
        assert_eq!(cfg.task_attempts, 5);
        assert_eq!(cfg.adb_path, "adb");
        assert_eq!(cfg.wait_timeout_secs, 10);
    }

    #[test]
    fn test_json_round_trip() {
        let mut cfg = DriverConfig::default();
        cfg.match_threshold = 0.92;
        cfg.connect_candidates = vec!["10.0.0.5:5555".into()];

        let json = serde_json::to_string(&cfg).expect("serialize");
        let restored: DriverConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let cfg = DriverConfig::load("/nonexistent/droidpilot.json").expect("load");
        assert_eq!(cfg, DriverConfig::default());
    }
}
