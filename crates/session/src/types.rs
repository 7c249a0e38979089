//! Public types for the session manager.

use std::fmt;

use chrono::{DateTime, Utc};

/// Lifecycle state of the single remote session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Handshake and authentication in progress.
    Connecting,
    Connected,
    /// The last connect failed or the connection was lost.
    Errored,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Snapshot of the current or last session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub passive: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
