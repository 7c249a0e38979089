//! Deploy error types.

use dumpdeploy_session::SessionError;
use dumpdeploy_transfer::TransferError;

/// Errors that reject or abort a whole batch.
///
/// Failures of a single target are reported in its
/// [`TransferResult`](crate::TransferResult) instead.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("not connected")]
    NotConnected,

    #[error("another operation is using the session")]
    OperationInProgress,

    #[error("session lost: {0}")]
    SessionLost(String),

    #[error("invalid artifact pair: {0}")]
    Artifact(#[from] TransferError),

    #[error("batch worker failed: {0}")]
    Worker(String),
}

impl From<SessionError> for DeployError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotConnected => Self::NotConnected,
            SessionError::OperationInProgress => Self::OperationInProgress,
            SessionError::SessionLost(reason) => Self::SessionLost(reason),
            other => Self::SessionLost(other.to_string()),
        }
    }
}
