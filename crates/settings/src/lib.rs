//! Settings record persisted as TOML.
//!
//! Stored at:
//! - Linux: `$XDG_CONFIG_HOME/dumpdeploy/settings.toml` or
//!   `~/.config/dumpdeploy/settings.toml`
//! - Windows: `%APPDATA%/dumpdeploy/settings.toml`

mod store;

pub use store::{SettingsStore, default_settings_path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dumpdeploy_session::SessionConfig;
use dumpdeploy_transfer::{DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE, OfficialFingerprint};

/// Errors reading or writing the settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no configuration directory (HOME/APPDATA not set)")]
    NoConfigDir,
}

/// Everything remembered between runs.
///
/// Missing keys take their defaults and unknown keys are ignored, so
/// files written by older or newer versions still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub host: String,
    pub port: u32,
    pub username: String,
    pub passive_mode: bool,
    /// Seconds.
    pub timeout: u64,
    /// Bytes per upload write.
    pub chunk_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Sizes of the last known official release.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official: Option<OfficialFingerprint>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            host: session.host,
            port: session.port,
            username: session.username,
            passive_mode: session.passive,
            timeout: session.timeout_secs,
            chunk_size: DEFAULT_CHUNK_SIZE,
            last_connected_at: None,
            official: None,
        }
    }
}

impl AppSettings {
    /// Session parameters from the stored connection fields.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            passive: self.passive_mode,
            timeout_secs: self.timeout,
        }
    }

    /// Remembers the parameters of a successful connection.
    pub fn record_connection(&mut self, config: &SessionConfig, at: DateTime<Utc>) {
        self.host = config.host.clone();
        self.port = config.port;
        self.username = config.username.clone();
        self.passive_mode = config.passive;
        self.timeout = config.timeout_secs;
        self.last_connected_at = Some(at);
    }

    /// Chunk size, raised to the minimum if the stored value is smaller.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(MIN_CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_session_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.port, 1337);
        assert_eq!(settings.username, "anonymous");
        assert!(settings.passive_mode);
        assert_eq!(settings.timeout, 30);
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(settings.official.is_none());
        assert_eq!(settings.to_session_config(), SessionConfig::default());
    }

    #[test]
    fn record_connection_copies_fields() {
        let mut settings = AppSettings::default();
        let config = SessionConfig {
            port: 2121,
            passive: false,
            timeout_secs: 60,
            ..SessionConfig::new("192.168.1.50")
        };
        let at = Utc::now();
        settings.record_connection(&config, at);

        assert_eq!(settings.to_session_config(), config);
        assert_eq!(settings.last_connected_at, Some(at));
    }

    #[test]
    fn tiny_chunk_size_is_raised() {
        let settings = AppSettings {
            chunk_size: 16,
            ..AppSettings::default()
        };
        assert_eq!(settings.effective_chunk_size(), MIN_CHUNK_SIZE);
    }
}
