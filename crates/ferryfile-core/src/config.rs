//! Transfer engine configuration and persisted settings.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Directory name used under the platform config dir.
pub const APP_DIR: &str = "ferryfile";

/// Tuning knobs for the transfer worker and queue.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct TransferConfig {
    /// How long a conflict prompt may stay unanswered.
    #[builder(default = "300")]
    #[serde(default = "default_conflict_timeout")]
    pub conflict_timeout_secs: u64,

    /// Buffer size of a worker's event channel.
    #[builder(default = "100")]
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,

    /// Buffer size of the queue's broadcast channel.
    #[builder(default = "256")]
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Keep modification times on local copies.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub preserve_timestamps: bool,

    /// Where VFS to VFS transfers are staged (system temp dir if unset).
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Connect timeout for network providers.
    #[builder(default = "30")]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Used by tests that cannot wait whole seconds.
    #[builder(default)]
    #[serde(skip)]
    pub conflict_timeout_override: Option<Duration>,
}

fn default_conflict_timeout() -> u64 {
    300
}

fn default_channel_size() -> usize {
    100
}

fn default_event_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    30
}

impl TransferConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.conflict_timeout_secs == Some(0) {
            return Err("Conflict timeout must be greater than zero".to_string());
        }
        if self.channel_size == Some(0) {
            return Err("Channel size must be greater than zero".to_string());
        }
        if self.event_capacity == Some(0) {
            return Err("Event capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            conflict_timeout_secs: default_conflict_timeout(),
            channel_size: default_channel_size(),
            event_capacity: default_event_capacity(),
            preserve_timestamps: true,
            temp_dir: None,
            connect_timeout_secs: default_connect_timeout(),
            conflict_timeout_override: None,
        }
    }
}

impl TransferConfig {
    /// Create a new config builder.
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::default()
    }

    pub fn conflict_timeout(&self) -> Duration {
        self.conflict_timeout_override
            .unwrap_or(Duration::from_secs(self.conflict_timeout_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Settings persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Settings {
    /// Path of the settings file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("settings.toml"))
    }

    /// Load settings from disk, or return defaults.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from a specific file, or return defaults.
    pub fn load_from(path: &std::path::Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| toml::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Save settings to disk.
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "No config directory")
        })?;
        self.save_to(&path)
    }

    /// Save settings to a specific file, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(path, content)
    }
}
