use std::time::Duration;

use crate::types::{ArtifactKind, Location};

/// Default FTP port of the console-side payload server.
pub const DEFAULT_PORT: u16 = 1337;

/// Default login name; the payload server accepts any credentials.
pub const DEFAULT_USERNAME: &str = "anonymous";

/// Default handshake/command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Accepted timeout range in seconds (inclusive).
pub const MIN_TIMEOUT_SECS: u64 = 5;
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Destination name of the executable artifact inside every target.
pub const EXECUTABLE_NAME: &str = "dump_runner.elf";

/// Destination name of the config artifact inside every target.
pub const CONFIG_NAME: &str = "homebrew.js";

/// Number of removable (USB) and expansion (extended storage) slots.
pub const SLOT_COUNT: u8 = 8;

/// Mount prefix for internal storage.
pub const INTERNAL_PREFIX: &str = "/data";

/// Directory under every mount prefix that holds the targets.
pub const TARGET_DIR: &str = "homebrew";

/// Directories scanned on a local volume, relative to its root.
pub const LOCAL_TARGET_DIRS: [&str; 2] = ["homebrew", "etaHEN/games"];

/// Pause between retries of a transient listing failure.
pub const LIST_RETRY_DELAY: Duration = Duration::from_millis(300);

/// Retries after the first failed listing attempt.
pub const LIST_RETRIES: u32 = 2;

/// Mount prefix for a removable slot (`/mnt/usb<n>`).
pub fn removable_prefix(slot: u8) -> String {
    format!("/mnt/usb{slot}")
}

/// Mount prefix for an expansion slot (`/mnt/ext<n>`).
pub fn expansion_prefix(slot: u8) -> String {
    format!("/mnt/ext{slot}")
}

/// Fixed destination file name for an artifact kind.
pub fn destination_name(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Executable => EXECUTABLE_NAME,
        ArtifactKind::Config => CONFIG_NAME,
    }
}

/// One top-level path scanned for targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRoot {
    /// Absolute protocol path with trailing slash, e.g. `/mnt/usb0/homebrew/`.
    pub path: String,
    pub location: Location,
}

/// Generates the fixed candidate root set.
///
/// Order: internal, removable slots 0–7, expansion slots 0–7.
pub fn candidate_roots() -> Vec<CandidateRoot> {
    let mut roots = Vec::with_capacity(1 + 2 * SLOT_COUNT as usize);
    roots.push(CandidateRoot {
        path: format!("{INTERNAL_PREFIX}/{TARGET_DIR}/"),
        location: Location::Internal,
    });
    for slot in 0..SLOT_COUNT {
        roots.push(CandidateRoot {
            path: format!("{}/{TARGET_DIR}/", removable_prefix(slot)),
            location: Location::RemovableSlot(slot),
        });
    }
    for slot in 0..SLOT_COUNT {
        roots.push(CandidateRoot {
            path: format!("{}/{TARGET_DIR}/", expansion_prefix(slot)),
            location: Location::ExpansionSlot(slot),
        });
    }
    roots
}

/// Roots scanned on a local volume, as paths below the volume root.
pub fn local_volume_roots() -> Vec<CandidateRoot> {
    LOCAL_TARGET_DIRS
        .iter()
        .map(|dir| CandidateRoot {
            path: format!("/{dir}/"),
            location: Location::LocalVolume,
        })
        .collect()
}
