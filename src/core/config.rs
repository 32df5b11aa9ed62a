use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

use super::alerts::model::AlertEngineConfig;

/// Environment variable naming the directory that holds settings.json
pub const ENV_CONFIG_DIR: &str = "DEAF_ALERT_CONFIG_DIR";

/// Application settings: feed connections, alert policy and sound location.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub message_bus: MessageBusSettings,
    #[serde(default)]
    pub document_feed: DocumentFeedSettings,
    /// Alert lifecycle and feedback policy
    #[serde(default)]
    pub alerts: AlertEngineConfig,
    /// Directory holding the sound clips named in the alert policy
    #[serde(default = "default_sound_dir")]
    pub sound_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            message_bus: MessageBusSettings::default(),
            document_feed: DocumentFeedSettings::default(),
            alerts: AlertEngineConfig::default(),
            sound_dir: default_sound_dir(),
        }
    }
}

fn default_sound_dir() -> PathBuf {
    PathBuf::from("sounds")
}

/// Siren topic subscription
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MessageBusSettings {
    pub enabled: bool,
    pub broker_addr: String,
    pub topic: String,
    pub reconnect_backoff_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for MessageBusSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_addr: "127.0.0.1:9001".to_string(),
            topic: "alerts/siren_detected".to_string(),
            reconnect_backoff_ms: 1000,
            connect_timeout_ms: 4000,
        }
    }
}

/// Horn "latest document" feed
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DocumentFeedSettings {
    pub enabled: bool,
    pub path: PathBuf,
    /// Field the feed orders by, descending
    pub order_field: String,
    pub poll_interval_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for DocumentFeedSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("alerts.jsonl"),
            order_field: "timestamp".to_string(),
            poll_interval_ms: 250,
            reconnect_backoff_ms: 1000,
            connect_timeout_ms: 4000,
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Config directory from `DEAF_ALERT_CONFIG_DIR`, or the working directory.
    pub fn from_env() -> Self {
        let dir = std::env::var_os(ENV_CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir)
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load settings, falling back to defaults if the file is missing or invalid.
    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!("Invalid {:?}, using defaults: {}", self.config_path, e),
                },
                Err(e) => log::warn!("Cannot read {:?}, using defaults: {}", self.config_path, e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
