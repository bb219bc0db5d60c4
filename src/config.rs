use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ProvisionError, ProvisionResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdbSettings {
    /// Path to the adb executable. Empty means: find `adb` on PATH.
    pub command_path: String,
    /// Per-command watchdog in seconds. 0 disables it; commands then block
    /// until the bridge process exits.
    pub command_timeout_secs: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            command_timeout_secs: 0,
        }
    }
}

impl AdbSettings {
    pub fn command_timeout(&self) -> Option<Duration> {
        if self.command_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.command_timeout_secs))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingSettings {
    pub poll_interval_ms: u64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}

impl TrackingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BootSettings {
    pub poll_delay_ms: u64,
    /// Upper bound for a boot wait in seconds. Absent means wait forever,
    /// matching the default driver behavior.
    pub deadline_secs: Option<u64>,
    /// Whether the device boots through the disk-encryption unlock sequence.
    pub encrypted: bool,
}

impl Default for BootSettings {
    fn default() -> Self {
        Self {
            poll_delay_ms: 200,
            deadline_secs: None,
            encrypted: false,
        }
    }
}

impl BootSettings {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub tracking: TrackingSettings,
    #[serde(default)]
    pub boot: BootSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DROIDPROV_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".droidprov_config.json")
}

pub fn backup_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".droidprov_config.backup.json")
}

pub fn load_config() -> ProvisionResult<ProvisionConfig> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &ProvisionConfig) -> ProvisionResult<()> {
    save_config_to_path(config, &config_path(), &backup_config_path())
}

pub fn load_config_from_path(path: &Path) -> ProvisionResult<ProvisionConfig> {
    if !path.exists() {
        return Ok(ProvisionConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| ProvisionError::config(format!("failed to read config: {err}")))?;
    let config: ProvisionConfig = serde_json::from_str(&raw)
        .map_err(|err| ProvisionError::config(format!("failed to parse config: {err}")))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &ProvisionConfig,
    path: &Path,
    backup_path: &Path,
) -> ProvisionResult<()> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| ProvisionError::config(format!("failed to serialize config: {err}")))?;
    fs::write(path, payload)
        .map_err(|err| ProvisionError::config(format!("failed to write config: {err}")))?;
    Ok(())
}

fn validate_config(mut config: ProvisionConfig) -> ProvisionConfig {
    // A zero tracking interval would spin the watcher thread.
    if config.tracking.poll_interval_ms == 0 {
        config.tracking.poll_interval_ms = 500;
    }
    if config.boot.poll_delay_ms > 60_000 {
        config.boot.poll_delay_ms = 200;
    }
    if config.boot.deadline_secs == Some(0) {
        config.boot.deadline_secs = None;
    }
    config
}
