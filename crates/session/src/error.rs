use dumpdeploy_protocol::RemoteError;

/// Errors from session lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    #[error("connection failed: {0}")]
    ConnectionFailure(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("not connected")]
    NotConnected,

    #[error("another operation is using the session")]
    OperationInProgress,

    #[error("already connected")]
    AlreadyConnected,

    #[error("session lost: {0}")]
    SessionLost(String),
}

impl SessionError {
    /// Maps a handshake failure to the connect error taxonomy.
    pub(crate) fn from_handshake(err: RemoteError) -> Self {
        match err {
            RemoteError::Auth(msg) => Self::AuthenticationFailure(msg),
            RemoteError::Timeout(msg) => Self::Timeout(msg),
            RemoteError::Connect(msg) => Self::ConnectionFailure(msg),
            other => Self::ConnectionFailure(other.to_string()),
        }
    }
}
