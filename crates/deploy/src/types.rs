//! Data types for the batch upload flow.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use dumpdeploy_protocol::{ArtifactKind, Target};
use dumpdeploy_transfer::ArtifactPair;

/// Lifecycle of a batch operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    #[default]
    Pending,
    Running,
    /// Ran to the end, or halted early because the session was lost.
    Completed,
    Cancelled,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome for one attempted target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferResult {
    pub target_path: String,
    /// Both artifacts were written.
    pub success: bool,
    pub executable_ok: bool,
    pub config_ok: bool,
    pub error: Option<String>,
    pub bytes_transferred: u64,
    pub elapsed: Duration,
}

impl TransferResult {
    pub fn artifact_ok(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Executable => self.executable_ok,
            ArtifactKind::Config => self.config_ok,
        }
    }
}

/// Bytes sent so far for one artifact of one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
    pub index: usize,
    pub path: String,
    pub artifact: ArtifactKind,
    pub bytes_sent: u64,
    pub bytes_total: u64,
    pub percent: f64,
    pub bytes_per_second: f64,
    /// Time left for this artifact at the current speed.
    pub eta: Option<Duration>,
}

/// Events emitted by a running batch.
///
/// Per target the order is `TargetStarted`, its `Progress` events in
/// byte order, then `TargetFinished`. `Progress` may be dropped when the
/// observer lags; the other events are always delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Started {
        id: Uuid,
        targets: usize,
    },
    TargetStarted {
        index: usize,
        total: usize,
        path: String,
    },
    Progress(TransferProgress),
    TargetFinished {
        index: usize,
        result: TransferResult,
    },
    Finished {
        id: Uuid,
        state: BatchState,
        attempted: usize,
        requested: usize,
    },
}

/// One batch: the pair, the ordered targets and the results so far.
#[derive(Debug, Clone)]
pub struct BatchOperation {
    pub id: Uuid,
    pub pair: ArtifactPair,
    pub targets: Vec<Target>,
    pub state: BatchState,
    pub results: Vec<TransferResult>,
}

impl BatchOperation {
    pub fn new(pair: ArtifactPair, targets: Vec<Target>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pair,
            targets,
            state: BatchState::Pending,
            results: Vec::new(),
        }
    }

    pub(crate) fn into_report(
        self,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        dropped_events: u64,
    ) -> BatchReport {
        BatchReport {
            id: self.id,
            version: self.pair.version,
            state: self.state,
            requested: self.targets.len(),
            results: self.results,
            started_at,
            elapsed,
            dropped_events,
        }
    }
}

/// Final result of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub id: Uuid,
    pub version: String,
    pub state: BatchState,
    /// Number of targets submitted.
    pub requested: usize,
    /// One entry per attempted target, in submission order.
    pub results: Vec<TransferResult>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Progress events lost because the observer lagged.
    pub dropped_events: u64,
}

impl BatchReport {
    /// Fewer results than targets: cancelled or halted.
    pub fn is_truncated(&self) -> bool {
        self.results.len() < self.requested
    }

    /// Stopped early because the session was lost.
    pub fn is_halted(&self) -> bool {
        self.state == BatchState::Completed && self.is_truncated()
    }

    pub fn summary(&self) -> BatchSummary {
        let succeeded = self.results.iter().filter(|r| r.success).count();
        BatchSummary {
            requested: self.requested,
            attempted: self.results.len(),
            succeeded,
            failed: self.results.len() - succeeded,
            bytes: self.results.iter().map(|r| r.bytes_transferred).sum(),
            duration: self.elapsed,
            failures: self
                .results
                .iter()
                .filter(|r| !r.success)
                .map(|r| TransferFailure {
                    path: r.target_path.clone(),
                    error: r.error.clone().unwrap_or_default(),
                })
                .collect(),
            truncated: self.is_truncated(),
        }
    }
}

/// A target that did not receive both artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFailure {
    pub path: String,
    pub error: String,
}

/// Counts derived from a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub requested: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes: u64,
    pub duration: Duration,
    pub failures: Vec<TransferFailure>,
    pub truncated: bool,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        !self.truncated && self.failed == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} targets succeeded, {} failed, {} bytes in {:.1}s",
            self.succeeded,
            self.requested,
            self.failed,
            self.bytes,
            self.duration.as_secs_f64()
        )?;
        if self.truncated {
            write!(f, " ({} not attempted)", self.requested - self.attempted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(path: &str, exe: bool, cfg: bool, bytes: u64) -> TransferResult {
        TransferResult {
            target_path: path.into(),
            success: exe && cfg,
            executable_ok: exe,
            config_ok: cfg,
            error: (!(exe && cfg)).then(|| "config: timed out".to_string()),
            bytes_transferred: bytes,
            elapsed: Duration::from_millis(10),
        }
    }

    fn report(state: BatchState, requested: usize, results: Vec<TransferResult>) -> BatchReport {
        BatchReport {
            id: Uuid::new_v4(),
            version: "v1".into(),
            state,
            requested,
            results,
            started_at: Utc::now(),
            elapsed: Duration::from_secs(2),
            dropped_events: 0,
        }
    }

    #[test]
    fn summary_counts_failures() {
        let report = report(
            BatchState::Completed,
            3,
            vec![
                result("/data/homebrew/G1", true, true, 100),
                result("/data/homebrew/G2", true, false, 60),
                result("/data/homebrew/G3", true, true, 100),
            ],
        );
        let summary = report.summary();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.bytes, 260);
        assert_eq!(summary.failures[0].path, "/data/homebrew/G2");
        assert!(!summary.truncated);
        assert!(!summary.all_succeeded());
        assert!(!report.is_halted());
        assert_eq!(
            summary.to_string(),
            "2/3 targets succeeded, 1 failed, 260 bytes in 2.0s"
        );
    }

    #[test]
    fn truncation_distinguishes_halt_from_cancel() {
        let results = vec![result("/data/homebrew/G1", true, true, 100)];
        let halted = report(BatchState::Completed, 3, results.clone());
        assert!(halted.is_truncated());
        assert!(halted.is_halted());
        assert!(halted.summary().to_string().ends_with("(2 not attempted)"));

        let cancelled = report(BatchState::Cancelled, 3, results);
        assert!(cancelled.is_truncated());
        assert!(!cancelled.is_halted());
    }

    #[test]
    fn artifact_flags() {
        let r = result("/data/homebrew/G1", true, false, 1);
        assert!(r.artifact_ok(ArtifactKind::Executable));
        assert!(!r.artifact_ok(ArtifactKind::Config));
        assert!(!r.success);
    }
}
