//! Session manager owning the one stateful remote connection.
//!
//! The open `RemoteFs` lives behind an async mutex. Scanning and
//! uploading borrow it through a [`SessionLease`]; a second borrower
//! is refused with `OperationInProgress` instead of waiting, so
//! commands from two operations can never interleave.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use dumpdeploy_protocol::{Connector, RemoteError, RemoteFs};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::types::{SessionInfo, SessionState};

type Slot = Option<Box<dyn RemoteFs>>;

struct Shared {
    state: watch::Sender<SessionState>,
    info: StdMutex<SessionInfo>,
}

impl Shared {
    fn info(&self) -> MutexGuard<'_, SessionInfo> {
        self.info.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
        debug!(%state, "session state changed");
    }

    fn fail(&self, err: SessionError) -> SessionError {
        self.info().last_error = Some(err.to_string());
        self.set_state(SessionState::Errored);
        err
    }
}

/// Leaves `Connecting` for `Errored` if a connect future is dropped
/// before the handshake settles.
struct ConnectAttempt<'a> {
    shared: &'a Shared,
    settled: bool,
}

impl ConnectAttempt<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("connect abandoned before the handshake finished");
            self.shared.info().last_error = Some("connect cancelled".into());
            self.shared.set_state(SessionState::Errored);
        }
    }
}

/// Owns the lifecycle of one remote session.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    remote: Arc<Mutex<Slot>>,
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            connector,
            remote: Arc::new(Mutex::new(None)),
            shared: Arc::new(Shared {
                state,
                info: StdMutex::new(SessionInfo::default()),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Snapshot of the current or last session.
    pub fn info(&self) -> SessionInfo {
        self.shared.info().clone()
    }

    /// Opens, authenticates and configures a new session.
    ///
    /// Valid from `Disconnected` or `Errored`. The config is validated
    /// before any network I/O; the whole handshake is bounded by the
    /// configured timeout.
    pub async fn connect(&self, config: &SessionConfig, password: &str) -> Result<(), SessionError> {
        config.validate()?;
        let port = config.socket_port()?;

        let mut slot = self
            .remote
            .clone()
            .try_lock_owned()
            .map_err(|_| SessionError::OperationInProgress)?;
        match self.state() {
            SessionState::Connected => return Err(SessionError::AlreadyConnected),
            SessionState::Connecting => return Err(SessionError::OperationInProgress),
            SessionState::Disconnected | SessionState::Errored => {}
        }
        if let Some(mut stale) = slot.take() {
            let _ = stale.close().await;
        }

        self.shared.set_state(SessionState::Connecting);
        let attempt = ConnectAttempt {
            shared: &self.shared,
            settled: false,
        };
        info!(
            host = %config.host,
            port,
            user = %config.username,
            passive = config.passive,
            "connecting"
        );

        let limit = config.timeout();
        let handshake = async {
            let mut remote = self.connector.open(&config.host, port, limit).await?;
            remote.authenticate(&config.username, password).await?;
            remote.set_transfer_mode(config.passive).await?;
            Ok::<_, RemoteError>(remote)
        };

        let remote = match timeout(limit, handshake).await {
            Ok(Ok(remote)) => remote,
            Ok(Err(e)) => {
                warn!(host = %config.host, error = %e, "connect failed");
                attempt.settle();
                return Err(self.shared.fail(SessionError::from_handshake(e)));
            }
            Err(_) => {
                warn!(host = %config.host, "connect timed out");
                attempt.settle();
                return Err(self.shared.fail(SessionError::Timeout(format!(
                    "handshake exceeded {}s",
                    config.timeout_secs
                ))));
            }
        };

        *slot = Some(remote);
        let now = Utc::now();
        *self.shared.info() = SessionInfo {
            host: config.host.clone(),
            port,
            username: config.username.clone(),
            passive: config.passive,
            connected_at: Some(now),
            last_activity: Some(now),
            last_error: None,
        };
        self.shared.set_state(SessionState::Connected);
        attempt.settle();
        info!(host = %config.host, port, "connected");
        Ok(())
    }

    /// Closes the session. Always ends in `Disconnected`.
    ///
    /// Waits for an active scan or batch to release the session first.
    pub async fn disconnect(&self) {
        let mut slot = self.remote.lock().await;
        if let Some(mut remote) = slot.take() {
            if let Err(e) = remote.close().await {
                debug!(error = %e, "close failed");
            }
            info!("disconnected");
        }
        self.shared.set_state(SessionState::Disconnected);
    }

    /// Borrows the session exclusively for one operation.
    pub fn lease(&self) -> Result<SessionLease, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let slot = self
            .remote
            .clone()
            .try_lock_owned()
            .map_err(|_| SessionError::OperationInProgress)?;
        if slot.is_none() || !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        Ok(SessionLease {
            slot,
            shared: self.shared.clone(),
        })
    }

    /// Sends a liveness probe; a dead peer moves the session to `Errored`.
    pub async fn keepalive(&self) -> Result<(), SessionError> {
        let mut lease = self.lease()?;
        let result = lease.remote()?.ping().await;
        match result {
            Ok(()) => {
                lease.touch();
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                lease.mark_lost(&reason);
                Err(SessionError::SessionLost(reason))
            }
        }
    }
}

/// Exclusive access to the connected session for one operation.
///
/// Dropping the lease makes the session available again.
pub struct SessionLease {
    slot: OwnedMutexGuard<Slot>,
    shared: Arc<Shared>,
}

impl SessionLease {
    /// The open session; `NotConnected` once it has been marked lost.
    pub fn remote(&mut self) -> Result<&mut Box<dyn RemoteFs>, SessionError> {
        self.slot.as_mut().ok_or(SessionError::NotConnected)
    }

    pub fn is_lost(&self) -> bool {
        self.slot.is_none()
    }

    /// Records activity on the session.
    pub fn touch(&self) {
        self.shared.info().last_activity = Some(Utc::now());
    }

    /// Drops the unusable connection and moves the session to `Errored`.
    pub fn mark_lost(&mut self, reason: &str) {
        if self.slot.take().is_some() {
            error!(reason, "session lost");
        }
        self.shared.info().last_error = Some(reason.to_string());
        self.shared.set_state(SessionState::Errored);
    }

    /// Marks the session lost if `err` is a session fault.
    ///
    /// Returns true when the session can no longer be used.
    pub fn check_fault(&mut self, err: &RemoteError) -> bool {
        if err.is_session_fault() {
            self.mark_lost(&err.to_string());
        }
        self.is_lost()
    }
}
