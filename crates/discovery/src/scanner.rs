//! Candidate-root scanning and per-target installation probe.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use dumpdeploy_protocol::constants::{LIST_RETRIES, LIST_RETRY_DELAY, destination_name};
use dumpdeploy_protocol::{
    ArtifactKind, CandidateRoot, InstallationStatus, RemoteError, RemoteFs, Target,
    candidate_roots, join_remote_path,
};
use dumpdeploy_session::{SessionLease, SessionManager};
use dumpdeploy_transfer::{
    ArtifactProbe, OfficialFingerprint, ProgressChannel, classify_installation,
};

use crate::ScanError;
use crate::report::{RootError, ScanEvent, ScanReport};

/// Discovers targets under a set of candidate roots.
pub struct DirectoryScanner {
    roots: Vec<CandidateRoot>,
    fingerprint: Option<OfficialFingerprint>,
    events: Option<ProgressChannel<ScanEvent>>,
    list_retries: u32,
    retry_delay: Duration,
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryScanner {
    pub fn new() -> Self {
        Self {
            roots: candidate_roots(),
            fingerprint: None,
            events: None,
            list_retries: LIST_RETRIES,
            retry_delay: LIST_RETRY_DELAY,
        }
    }

    /// Scans `roots` instead of the console's candidate roots, e.g.
    /// the target directories of a local volume.
    pub fn with_roots(mut self, roots: Vec<CandidateRoot>) -> Self {
        self.roots = roots;
        self
    }

    /// Sizes of the last known official pair; without one, installed
    /// targets classify as `Unknown`.
    pub fn with_fingerprint(mut self, fingerprint: Option<OfficialFingerprint>) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Attaches an observer for scan events.
    pub fn with_events(mut self, events: ProgressChannel<ScanEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(events) = &self.events {
            events.progress(event);
        }
    }

    /// Scans every candidate root.
    ///
    /// Absent or forbidden roots are skipped silently. Other failures on
    /// a root are recorded in the report and scanning moves on. Fails
    /// only if the session is unavailable or is lost during the scan.
    pub async fn scan(&self, session: &SessionManager) -> Result<ScanReport, ScanError> {
        let mut lease = session.lease()?;
        self.scan_with(&mut lease).await
    }

    /// [`scan`](Self::scan) on an already held lease.
    pub async fn scan_with(&self, lease: &mut SessionLease) -> Result<ScanReport, ScanError> {
        let started = Instant::now();
        let mut targets = Vec::new();
        let mut root_errors = Vec::new();

        for (index, root) in self.roots.iter().enumerate() {
            self.emit(ScanEvent::RootStarted {
                index,
                total: self.roots.len(),
                path: root.path.clone(),
            });

            let remote = lease.remote()?;
            let outcome = self.scan_root(remote.as_mut(), root).await;
            match outcome {
                Ok(None) => debug!(root = %root.path, "root absent, skipped"),
                Ok(Some(found)) => {
                    debug!(root = %root.path, count = found.len(), "root scanned");
                    targets.extend(found);
                }
                Err(e) if lease.check_fault(&e) => {
                    return Err(ScanError::SessionLost(e.to_string()));
                }
                Err(e) => {
                    warn!(root = %root.path, error = %e, "root scan failed");
                    let err = RootError {
                        path: root.path.clone(),
                        location: root.location,
                        message: e.to_string(),
                    };
                    self.emit(ScanEvent::RootFailed(err.clone()));
                    root_errors.push(err);
                }
            }
        }

        lease.touch();
        info!(
            targets = targets.len(),
            root_errors = root_errors.len(),
            "scan complete"
        );
        self.emit(ScanEvent::Finished {
            targets: targets.len(),
            root_errors: root_errors.len(),
        });

        Ok(ScanReport {
            targets,
            root_errors,
            scanned_at: Utc::now(),
            elapsed: started.elapsed(),
        })
    }

    /// Re-probes one target and returns an updated copy.
    pub async fn refresh(
        &self,
        session: &SessionManager,
        target: &Target,
    ) -> Result<Target, ScanError> {
        let mut lease = session.lease()?;
        self.refresh_with(&mut lease, target).await
    }

    /// [`refresh`](Self::refresh) on an already held lease.
    pub async fn refresh_with(
        &self,
        lease: &mut SessionLease,
        target: &Target,
    ) -> Result<Target, ScanError> {
        let remote = lease.remote()?;
        let probed = self.probe(remote.as_mut(), &target.path).await;
        match probed {
            Ok(status) => {
                lease.touch();
                debug!(path = %target.path, %status, "target refreshed");
                Ok(Target {
                    status,
                    ..target.clone()
                })
            }
            Err(e) => {
                lease.check_fault(&e);
                Err(ScanError::SessionLost(e.to_string()))
            }
        }
    }

    /// Lists one root. `Ok(None)` means the root is absent.
    ///
    /// Errors are either session faults or root-level failures.
    async fn scan_root(
        &self,
        remote: &mut dyn RemoteFs,
        root: &CandidateRoot,
    ) -> Result<Option<Vec<Target>>, RemoteError> {
        match remote.change_directory(&root.path).await {
            Ok(()) => {}
            Err(e) if e.is_unavailable() => return Ok(None),
            Err(e) => return Err(e),
        }

        let names = match self.list_with_retry(remote, &root.path).await {
            Ok(names) => names,
            // Entered but not listable: some servers refuse NLST on an empty directory.
            Err(e) if e.is_unavailable() => return Ok(Some(Vec::new())),
            Err(e) => return Err(e),
        };

        let base = root.path.trim_end_matches('/');
        let mut found = Vec::new();
        for name in names {
            if name.is_empty() || name == "." || name == ".." || name == base {
                continue;
            }
            match remote.is_directory(&root.path, &name).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) if e.is_session_fault() => return Err(e),
                Err(e) => {
                    warn!(root = %root.path, entry = %name, error = %e, "entry check failed");
                    continue;
                }
            }

            let mut target = Target::from_path(&join_remote_path(&root.path, &name), root.location);
            target.status = self.probe(remote, &target.path).await?;
            debug!(label = %target.label(), status = %target.status, "target found");
            self.emit(ScanEvent::TargetFound(target.clone()));
            found.push(target);
        }
        Ok(Some(found))
    }

    /// Lists `path`, retrying transient failures after a short pause.
    async fn list_with_retry(
        &self,
        remote: &mut dyn RemoteFs,
        path: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let mut attempt = 0;
        loop {
            let err = match remote.list_entry_names(path).await {
                Ok(names) => return Ok(names),
                Err(e) => e,
            };
            let permanent = err.is_unavailable()
                || err.is_session_fault()
                || matches!(err, RemoteError::Rejected { .. });
            if permanent || attempt >= self.list_retries {
                return Err(err);
            }
            attempt += 1;
            debug!(path, attempt, error = %err, "listing failed, retrying");
            tokio::time::sleep(self.retry_delay).await;
            if let Err(e) = remote.ping().await
                && e.is_session_fault()
            {
                return Err(e);
            }
        }
    }

    /// Classifies one target. Errors are session faults only; anything
    /// else makes the status `Unknown`.
    async fn probe(
        &self,
        remote: &mut dyn RemoteFs,
        path: &str,
    ) -> Result<InstallationStatus, RemoteError> {
        let mut probes = [ArtifactProbe::Absent; 2];
        for (slot, kind) in probes.iter_mut().zip(ArtifactKind::ORDER) {
            let name = destination_name(kind);
            let present = match remote.file_exists(path, name).await {
                Ok(present) => present,
                Err(e) if e.is_session_fault() => return Err(e),
                Err(e) => {
                    debug!(path, file = name, error = %e, "probe failed");
                    return Ok(InstallationStatus::Unknown);
                }
            };
            if !present {
                continue;
            }
            let size = if self.fingerprint.is_some() {
                match remote.file_size(path, name).await {
                    Ok(size) => size,
                    Err(e) if e.is_session_fault() => return Err(e),
                    Err(_) => None,
                }
            } else {
                None
            };
            *slot = ArtifactProbe::Present(size);
        }
        Ok(classify_installation(
            probes[0],
            probes[1],
            self.fingerprint.as_ref(),
        ))
    }
}
