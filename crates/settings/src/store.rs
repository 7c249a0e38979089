use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{AppSettings, SettingsError};

/// Reads and writes [`AppSettings`] at one path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at [`default_settings_path`].
    pub fn open_default() -> Result<Self, SettingsError> {
        default_settings_path()
            .map(Self::new)
            .ok_or(SettingsError::NoConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the settings; `None` if the file does not exist.
    pub fn try_load(&self) -> Result<Option<AppSettings>, SettingsError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let settings = toml::from_str(&content)?;
        debug!(path = %self.path.display(), "settings loaded");
        Ok(Some(settings))
    }

    /// Loads the settings, falling back to defaults if the file is
    /// missing or unreadable.
    pub fn load(&self) -> AppSettings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => AppSettings::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "settings unreadable, using defaults");
                AppSettings::default()
            }
        }
    }

    /// Writes the settings, creating the directory if needed.
    pub fn save(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(settings)?;
        std::fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Overwrites the file with defaults and returns them.
    pub fn reset(&self) -> Result<AppSettings, SettingsError> {
        let settings = AppSettings::default();
        self.save(&settings)?;
        Ok(settings)
    }
}

/// Platform settings file path.
pub fn default_settings_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("dumpdeploy").join("settings.toml"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}
