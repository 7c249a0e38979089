//! Target discovery over an open session.
//!
//! [`DirectoryScanner`] walks the fixed candidate roots one level deep
//! and classifies each discovered directory by probing for the two
//! artifact files.

pub mod report;
pub mod scanner;

pub use report::{RootError, ScanEvent, ScanReport};
pub use scanner::DirectoryScanner;

use dumpdeploy_session::SessionError;

/// Errors that abort a whole scan or refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("not connected")]
    NotConnected,

    #[error("another operation is using the session")]
    OperationInProgress,

    #[error("session lost during scan: {0}")]
    SessionLost(String),
}

impl From<SessionError> for ScanError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotConnected => Self::NotConnected,
            SessionError::OperationInProgress => Self::OperationInProgress,
            SessionError::SessionLost(reason) => Self::SessionLost(reason),
            other => Self::SessionLost(other.to_string()),
        }
    }
}
