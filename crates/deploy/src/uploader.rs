//! Sequential batch uploader.
//!
//! Targets are processed one at a time on a single leased session. Each
//! target receives the executable, then the config artifact, written in
//! chunks. Cancellation is checked before every target, every artifact
//! and every chunk; an interrupted write is aborted and the target gets
//! no result.

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dumpdeploy_protocol::constants::destination_name;
use dumpdeploy_protocol::{ArtifactKind, RemoteError, RemoteFs, Target};
use dumpdeploy_session::{SessionLease, SessionManager};
use dumpdeploy_transfer::{
    ArtifactPair, ChunkReader, DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE, ProgressChannel,
    SpeedCalculator, percent,
};

use crate::error::DeployError;
use crate::types::{
    BatchEvent, BatchOperation, BatchReport, BatchState, TransferProgress, TransferResult,
};

/// Undelivered events held for a lagging observer.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// How one artifact write ended.
enum SendOutcome {
    Done,
    /// Cancelled at a chunk boundary. Carries a fault seen while aborting.
    Cancelled(Option<RemoteError>),
    Failed(String),
    Lost(RemoteError),
}

/// How one target ended.
enum TargetOutcome {
    Finished(TransferResult),
    Cancelled,
    /// The session was lost while writing to this target.
    Halted(TransferResult),
}

/// Uploads an artifact pair to a list of targets.
#[derive(Debug, Clone, Copy)]
pub struct BatchUploader {
    chunk_size: usize,
    event_capacity: usize,
}

impl Default for BatchUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchUploader {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Bytes per write; values below [`MIN_CHUNK_SIZE`] are raised to it.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        self
    }

    /// Capacity of the event channel created by [`submit`](Self::submit).
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Starts a batch on a background task.
    ///
    /// The session stays leased until the batch ends, so a concurrent
    /// scan or second batch fails with `OperationInProgress`.
    pub fn submit(
        &self,
        session: &SessionManager,
        targets: Vec<Target>,
        pair: ArtifactPair,
    ) -> Result<BatchHandle, DeployError> {
        let mut lease = session.lease()?;
        pair.validate()?;

        let (events, events_rx) = ProgressChannel::new(self.event_capacity);
        let cancel = CancellationToken::new();
        let operation = BatchOperation::new(pair, targets);
        let id = operation.id;

        let uploader = *self;
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            uploader
                .execute(&mut lease, operation, &events, &token)
                .await
        });

        Ok(BatchHandle {
            id,
            events: Some(events_rx),
            cancel,
            task,
        })
    }

    /// Runs a batch to completion on the calling task.
    pub async fn run(
        &self,
        session: &SessionManager,
        targets: Vec<Target>,
        pair: ArtifactPair,
        events: &ProgressChannel<BatchEvent>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, DeployError> {
        let mut lease = session.lease()?;
        self.run_with(&mut lease, targets, pair, events, cancel).await
    }

    /// [`run`](Self::run) on an already held lease.
    pub async fn run_with(
        &self,
        lease: &mut SessionLease,
        targets: Vec<Target>,
        pair: ArtifactPair,
        events: &ProgressChannel<BatchEvent>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, DeployError> {
        if lease.is_lost() {
            return Err(DeployError::NotConnected);
        }
        pair.validate()?;
        let operation = BatchOperation::new(pair, targets);
        Ok(self.execute(lease, operation, events, cancel).await)
    }

    async fn execute(
        &self,
        lease: &mut SessionLease,
        mut op: BatchOperation,
        events: &ProgressChannel<BatchEvent>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let total = op.targets.len();

        op.state = BatchState::Running;
        info!(
            id = %op.id,
            targets = total,
            version = %op.pair.version,
            "batch started"
        );
        events
            .deliver(BatchEvent::Started {
                id: op.id,
                targets: total,
            })
            .await;

        for (index, target) in op.targets.iter().enumerate() {
            if cancel.is_cancelled() {
                op.state = BatchState::Cancelled;
                break;
            }
            events
                .deliver(BatchEvent::TargetStarted {
                    index,
                    total,
                    path: target.path.clone(),
                })
                .await;

            match self
                .transfer_target(lease, index, target, &op.pair, events, cancel)
                .await
            {
                TargetOutcome::Finished(result) => {
                    events
                        .deliver(BatchEvent::TargetFinished {
                            index,
                            result: result.clone(),
                        })
                        .await;
                    op.results.push(result);
                }
                TargetOutcome::Cancelled => {
                    op.state = BatchState::Cancelled;
                    break;
                }
                TargetOutcome::Halted(result) => {
                    error!(
                        path = %target.path,
                        remaining = total - index - 1,
                        "session lost, batch halted"
                    );
                    events
                        .deliver(BatchEvent::TargetFinished {
                            index,
                            result: result.clone(),
                        })
                        .await;
                    op.results.push(result);
                    break;
                }
            }
        }

        if op.state == BatchState::Running {
            op.state = BatchState::Completed;
        }
        if !lease.is_lost() {
            lease.touch();
        }

        let attempted = op.results.len();
        let succeeded = op.results.iter().filter(|r| r.success).count();
        info!(
            id = %op.id,
            state = %op.state,
            attempted,
            succeeded,
            requested = total,
            "batch finished"
        );
        events
            .deliver(BatchEvent::Finished {
                id: op.id,
                state: op.state,
                attempted,
                requested: total,
            })
            .await;

        op.into_report(started_at, clock.elapsed(), events.dropped())
    }

    async fn transfer_target(
        &self,
        lease: &mut SessionLease,
        index: usize,
        target: &Target,
        pair: &ArtifactPair,
        events: &ProgressChannel<BatchEvent>,
        cancel: &CancellationToken,
    ) -> TargetOutcome {
        let started = Instant::now();
        let mut ok = [false; 2];
        let mut errors = Vec::new();
        let mut bytes = 0u64;
        let mut lost = false;
        let mut speed = SpeedCalculator::default();

        for (slot, kind) in ArtifactKind::ORDER.into_iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(path = %target.path, "cancelled before {kind}");
                return TargetOutcome::Cancelled;
            }
            let remote = match lease.remote() {
                Ok(remote) => remote,
                Err(e) => {
                    errors.push(format!("{kind}: {e}"));
                    lost = true;
                    break;
                }
            };
            let outcome = self
                .send_artifact(
                    remote.as_mut(),
                    index,
                    target,
                    kind,
                    pair.path(kind),
                    events,
                    cancel,
                    &mut speed,
                    &mut bytes,
                )
                .await;

            match outcome {
                SendOutcome::Done => ok[slot] = true,
                SendOutcome::Cancelled(fault) => {
                    if let Some(e) = fault {
                        lease.check_fault(&e);
                    }
                    debug!(path = %target.path, artifact = %kind, "write cancelled");
                    return TargetOutcome::Cancelled;
                }
                SendOutcome::Failed(message) => {
                    warn!(path = %target.path, artifact = %kind, error = %message, "artifact write failed");
                    errors.push(format!("{kind}: {message}"));
                }
                SendOutcome::Lost(e) => {
                    errors.push(format!("{kind}: {e}"));
                    lease.check_fault(&e);
                    lost = true;
                    break;
                }
            }
        }

        let result = TransferResult {
            target_path: target.path.clone(),
            success: ok.iter().all(|&ok| ok),
            executable_ok: ok[0],
            config_ok: ok[1],
            error: (!errors.is_empty()).then(|| errors.join("; ")),
            bytes_transferred: bytes,
            elapsed: started.elapsed(),
        };
        debug!(
            path = %target.path,
            success = result.success,
            bytes = result.bytes_transferred,
            "target finished"
        );

        if lost {
            TargetOutcome::Halted(result)
        } else {
            TargetOutcome::Finished(result)
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_artifact(
        &self,
        remote: &mut dyn RemoteFs,
        index: usize,
        target: &Target,
        kind: ArtifactKind,
        local: &Path,
        events: &ProgressChannel<BatchEvent>,
        cancel: &CancellationToken,
        speed: &mut SpeedCalculator,
        bytes: &mut u64,
    ) -> SendOutcome {
        let name = destination_name(kind);
        let mut reader = match ChunkReader::open(local, self.chunk_size).await {
            Ok(reader) => reader,
            Err(e) => return SendOutcome::Failed(e.to_string()),
        };
        let total = reader.file_size();

        if let Err(e) = remote.write_begin(&target.path, name).await {
            return classify(e);
        }
        debug!(path = %target.path, file = name, bytes = total, "write started");

        speed.reset();
        speed.add_sample(0);

        loop {
            if cancel.is_cancelled() {
                let fault = abort(remote).await.err();
                return SendOutcome::Cancelled(fault);
            }

            let chunk = match reader.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    if let Err(fault) = abort(remote).await {
                        return SendOutcome::Lost(fault);
                    }
                    return SendOutcome::Failed(e.to_string());
                }
            };
            let len = chunk.len() as u64;

            if let Err(e) = remote.write_chunk(chunk).await {
                if e.is_session_fault() {
                    return SendOutcome::Lost(e);
                }
                if let Err(fault) = abort(remote).await {
                    return SendOutcome::Lost(fault);
                }
                return SendOutcome::Failed(e.to_string());
            }

            *bytes += len;
            speed.add_sample(len);
            let sent = reader.offset();
            events.progress(BatchEvent::Progress(TransferProgress {
                index,
                path: target.path.clone(),
                artifact: kind,
                bytes_sent: sent,
                bytes_total: total,
                percent: percent(sent, total),
                bytes_per_second: speed.bytes_per_second(),
                eta: speed.eta(reader.remaining()),
            }));
        }

        match remote.write_end().await {
            Ok(()) => {
                debug!(path = %target.path, file = name, "write complete");
                SendOutcome::Done
            }
            Err(e) => classify(e),
        }
    }
}

fn classify(err: RemoteError) -> SendOutcome {
    if err.is_session_fault() {
        SendOutcome::Lost(err)
    } else {
        SendOutcome::Failed(err.to_string())
    }
}

/// Ends an interrupted write. Only session faults are reported.
async fn abort(remote: &mut dyn RemoteFs) -> Result<(), RemoteError> {
    match remote.write_abort().await {
        Err(e) if e.is_session_fault() => Err(e),
        Err(e) => {
            debug!(error = %e, "abort failed");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// A batch running on a background task.
pub struct BatchHandle {
    id: Uuid,
    events: Option<mpsc::Receiver<BatchEvent>>,
    cancel: CancellationToken,
    task: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// The receiver must be drained; a full channel holds back the
    /// worker at the next target boundary.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<BatchEvent>> {
        self.events.take()
    }

    /// Requests cooperative cancellation.
    ///
    /// The worker stops at the next chunk boundary. Targets already
    /// finished keep their results.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the cancellation token for this batch.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the batch to end and returns its report.
    ///
    /// An untaken event receiver is dropped first so the worker never
    /// waits on it.
    pub async fn wait(mut self) -> Result<BatchReport, DeployError> {
        self.events.take();
        self.task
            .await
            .map_err(|e| DeployError::Worker(e.to_string()))
    }
}
