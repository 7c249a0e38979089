use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{INTERNAL_PREFIX, SLOT_COUNT};

/// Storage a target lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "slot")]
pub enum Location {
    Internal,
    RemovableSlot(u8),
    ExpansionSlot(u8),
    /// A volume mounted on this machine, e.g. the console's USB drive.
    LocalVolume,
}

impl Location {
    /// Maps an absolute protocol path back to the storage it belongs to.
    ///
    /// Returns `None` for paths outside the known mount prefixes or for
    /// slot numbers beyond the supported range.
    pub fn from_path(path: &str) -> Option<Self> {
        if path == INTERNAL_PREFIX || path.starts_with(&format!("{INTERNAL_PREFIX}/")) {
            return Some(Self::Internal);
        }
        if let Some(rest) = path.strip_prefix("/mnt/usb") {
            return parse_slot(rest).map(Self::RemovableSlot);
        }
        if let Some(rest) = path.strip_prefix("/mnt/ext") {
            return parse_slot(rest).map(Self::ExpansionSlot);
        }
        None
    }

    /// Short tag used in target labels (`INT`, `USB3`, `EXT0`).
    pub fn tag(&self) -> String {
        match self {
            Self::Internal => "INT".into(),
            Self::RemovableSlot(n) => format!("USB{n}"),
            Self::ExpansionSlot(n) => format!("EXT{n}"),
            Self::LocalVolume => "LOCAL".into(),
        }
    }
}

fn parse_slot(rest: &str) -> Option<u8> {
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let after = &rest[digits.len()..];
    if digits.is_empty() || !(after.is_empty() || after.starts_with('/')) {
        return None;
    }
    let slot: u8 = digits.parse().ok()?;
    (slot < SLOT_COUNT).then_some(slot)
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::RemovableSlot(n) => write!(f, "removable slot {n}"),
            Self::ExpansionSlot(n) => write!(f, "expansion slot {n}"),
            Self::LocalVolume => write!(f, "local volume"),
        }
    }
}

/// Whether the artifact pair is present in a target.
///
/// Best-effort heuristic: classification compares presence and sizes,
/// never file contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatus {
    #[default]
    NotInstalled,
    Official,
    Experimental,
    Unknown,
}

impl InstallationStatus {
    /// True unless the probe found neither artifact.
    pub fn is_installed(&self) -> bool {
        !matches!(self, Self::NotInstalled)
    }
}

impl fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotInstalled => "not installed",
            Self::Official => "official",
            Self::Experimental => "experimental",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One artifact of the deployed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Executable,
    Config,
}

impl ArtifactKind {
    /// Transfer order inside a target.
    pub const ORDER: [ArtifactKind; 2] = [ArtifactKind::Executable, ArtifactKind::Config];
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executable => f.write_str("executable"),
            Self::Config => f.write_str("config"),
        }
    }
}

/// A discovered remote directory eligible to receive the artifact pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Absolute protocol path without trailing slash.
    pub path: String,
    /// Last path segment.
    pub name: String,
    pub location: Location,
    pub status: InstallationStatus,
}

impl Target {
    /// Builds a target for `path`, deriving name and location from it.
    ///
    /// Paths outside the known mount prefixes fall back to `fallback`.
    pub fn from_path(path: &str, fallback: Location) -> Self {
        let path = path.trim_end_matches('/').to_string();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let location = Location::from_path(&path).unwrap_or(fallback);
        Self {
            path,
            name,
            location,
            status: InstallationStatus::NotInstalled,
        }
    }

    /// Human-readable label with a location tag, e.g. `[USB0] PPSA01234`.
    pub fn label(&self) -> String {
        format!("[{}] {}", self.location.tag(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_from_known_prefixes() {
        assert_eq!(Location::from_path("/data/homebrew/G1"), Some(Location::Internal));
        assert_eq!(
            Location::from_path("/mnt/usb3/homebrew/G1"),
            Some(Location::RemovableSlot(3))
        );
        assert_eq!(
            Location::from_path("/mnt/ext7/homebrew/"),
            Some(Location::ExpansionSlot(7))
        );
    }

    #[test]
    fn location_rejects_unknown_paths() {
        assert_eq!(Location::from_path("/mnt/usb8/homebrew"), None);
        assert_eq!(Location::from_path("/mnt/usbx/homebrew"), None);
        assert_eq!(Location::from_path("/mnt/usb10/homebrew"), None);
        assert_eq!(Location::from_path("/database/homebrew"), None);
        assert_eq!(Location::from_path("/user/app"), None);
    }

    #[test]
    fn target_from_path_strips_trailing_slash() {
        let target = Target::from_path("/mnt/usb0/homebrew/PPSA01234/", Location::Internal);
        assert_eq!(target.path, "/mnt/usb0/homebrew/PPSA01234");
        assert_eq!(target.name, "PPSA01234");
        assert_eq!(target.location, Location::RemovableSlot(0));
        assert_eq!(target.status, InstallationStatus::NotInstalled);
        assert_eq!(target.label(), "[USB0] PPSA01234");
    }

    #[test]
    fn status_installed_flag() {
        assert!(!InstallationStatus::NotInstalled.is_installed());
        assert!(InstallationStatus::Official.is_installed());
        assert!(InstallationStatus::Experimental.is_installed());
        assert!(InstallationStatus::Unknown.is_installed());
    }

    #[test]
    fn location_json_shape() {
        let json = serde_json::to_string(&Location::RemovableSlot(2)).unwrap();
        assert_eq!(json, r#"{"kind":"removable_slot","slot":2}"#);
        let internal: Location = serde_json::from_str(r#"{"kind":"internal"}"#).unwrap();
        assert_eq!(internal, Location::Internal);
    }
}
