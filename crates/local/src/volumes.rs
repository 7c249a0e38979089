//! Detection of mounted volumes that may hold targets.

use std::path::{Path, PathBuf};

use dumpdeploy_protocol::constants::LOCAL_TARGET_DIRS;
use serde::Serialize;
use tracing::debug;

/// Volume names macOS uses for its own disks.
const SYSTEM_VOLUMES: [&str; 3] = ["Macintosh HD", "System", "Data"];

/// A mounted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub path: PathBuf,
    pub label: String,
    pub removable: bool,
}

impl Volume {
    /// True when one of the scanned target directories exists on it.
    pub fn has_target_dirs(&self) -> bool {
        LOCAL_TARGET_DIRS
            .iter()
            .any(|dir| self.path.join(dir).is_dir())
    }
}

/// Volumes mounted on this machine, in path order.
#[cfg(windows)]
pub fn available_volumes() -> Vec<Volume> {
    (b'A'..=b'Z')
        .map(|letter| format!("{}:\\", letter as char))
        .filter(|root| Path::new(root).is_dir())
        .map(|root| Volume {
            label: root[..2].to_string(),
            path: PathBuf::from(root),
            removable: false,
        })
        .collect()
}

/// Volumes mounted on this machine, in path order.
#[cfg(not(windows))]
pub fn available_volumes() -> Vec<Volume> {
    mount_parents()
        .iter()
        .flat_map(|parent| volumes_under(parent))
        .collect()
}

#[cfg(target_os = "macos")]
fn mount_parents() -> Vec<PathBuf> {
    vec![PathBuf::from("/Volumes")]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn mount_parents() -> Vec<PathBuf> {
    let mut parents = vec![PathBuf::from("/mnt")];
    if let Some(user) = std::env::var_os("USER").or_else(|| std::env::var_os("LOGNAME")) {
        parents.push(Path::new("/media").join(&user));
        parents.push(Path::new("/run/media").join(&user));
    }
    parents
}

/// Every directory directly under `parent`, treated as one volume each.
/// Hidden directories are skipped.
pub fn volumes_under(parent: &Path) -> Vec<Volume> {
    let entries = match std::fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(parent = %parent.display(), error = %e, "no volumes here");
            return Vec::new();
        }
    };
    let mut volumes: Vec<Volume> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let label = entry.file_name().to_string_lossy().into_owned();
            if label.starts_with('.') {
                return None;
            }
            Some(Volume {
                removable: !SYSTEM_VOLUMES.contains(&label.as_str()),
                label,
                path: entry.path(),
            })
        })
        .collect();
    volumes.sort_by(|a, b| a.path.cmp(&b.path));
    volumes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_directories_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("usb1/homebrew")).unwrap();
        std::fs::create_dir(dir.path().join("Macintosh HD")).unwrap();
        std::fs::create_dir(dir.path().join(".Trashes")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let volumes = volumes_under(dir.path());
        let labels: Vec<_> = volumes.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(labels, vec!["Macintosh HD", "usb1"]);
        assert!(!volumes[0].removable);
        assert!(volumes[1].removable);
        assert!(!volumes[0].has_target_dirs());
        assert!(volumes[1].has_target_dirs());
    }

    #[test]
    fn missing_parent_has_no_volumes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(volumes_under(&dir.path().join("absent")).is_empty());
    }
}
