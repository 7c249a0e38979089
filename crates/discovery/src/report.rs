use std::time::Duration;

use chrono::{DateTime, Utc};

use dumpdeploy_protocol::{Location, Target};

/// A candidate root that exists but could not be scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootError {
    pub path: String,
    pub location: Location,
    pub message: String,
}

/// Events emitted while scanning, if an observer is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    RootStarted {
        index: usize,
        total: usize,
        path: String,
    },
    TargetFound(Target),
    RootFailed(RootError),
    Finished {
        targets: usize,
        root_errors: usize,
    },
}

/// Result of one full scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// Discovered targets in root order, then listing order.
    pub targets: Vec<Target>,
    pub root_errors: Vec<RootError>,
    pub scanned_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl ScanReport {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target at `path` (a trailing slash is ignored).
    pub fn find(&self, path: &str) -> Option<&Target> {
        let path = path.trim_end_matches('/');
        self.targets.iter().find(|t| t.path == path)
    }

    pub fn by_location(&self, location: Location) -> Vec<&Target> {
        self.targets
            .iter()
            .filter(|t| t.location == location)
            .collect()
    }

    pub fn installed(&self) -> Vec<&Target> {
        self.targets
            .iter()
            .filter(|t| t.status.is_installed())
            .collect()
    }

    pub fn not_installed(&self) -> Vec<&Target> {
        self.targets
            .iter()
            .filter(|t| !t.status.is_installed())
            .collect()
    }

    /// Replaces the entry with the same path, e.g. after a refresh.
    ///
    /// Returns false if no such target was in the report.
    pub fn replace(&mut self, target: Target) -> bool {
        match self.targets.iter_mut().find(|t| t.path == target.path) {
            Some(slot) => {
                *slot = target;
                true
            }
            None => false,
        }
    }
}
