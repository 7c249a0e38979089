//! Capability set consumed from the remote file-transfer endpoint.
//!
//! Bindings implement [`Connector`] (open a control connection) and
//! [`RemoteFs`] (operations on one open, stateful session). Keeping the
//! engine on these traits leaves it independent of the wire protocol and
//! testable against the in-memory double.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by every capability method.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Errors reported by a protocol binding.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// The path does not exist or may not be entered.
    #[error("path unavailable: {0}")]
    Unavailable(String),

    #[error("command rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The control connection is gone; the session cannot be reused.
    #[error("connection lost: {0}")]
    Lost(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no write in progress")]
    NoActiveWrite,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// True when the whole session is unusable, not just one command.
    pub fn is_session_fault(&self) -> bool {
        matches!(self, Self::Lost(_))
    }

    /// True when a path is simply absent or not permitted.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Opens new sessions against a remote endpoint.
pub trait Connector: Send + Sync {
    /// Opens the control connection; the handshake must finish within `timeout`.
    fn open<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        timeout: Duration,
    ) -> RemoteFuture<'a, Box<dyn RemoteFs>>;
}

/// Operations on one open session.
///
/// A session is a single stateful channel: callers must serialize every
/// command. Writes are chunked; exactly one write may be open at a time
/// (`write_begin` … `write_chunk`* … `write_end` | `write_abort`).
pub trait RemoteFs: Send {
    /// Logs in with the given credentials.
    fn authenticate<'a>(&'a mut self, username: &'a str, password: &'a str)
    -> RemoteFuture<'a, ()>;

    /// Selects passive or active data connections and binary transfers.
    fn set_transfer_mode(&mut self, passive: bool) -> RemoteFuture<'_, ()>;

    /// Enters `path`. Absent or forbidden paths fail with `Unavailable`.
    fn change_directory<'a>(&'a mut self, path: &'a str) -> RemoteFuture<'a, ()>;

    /// Names (last segment only) of the immediate entries of `path`.
    fn list_entry_names<'a>(&'a mut self, path: &'a str) -> RemoteFuture<'a, Vec<String>>;

    /// Whether `path/name` is a directory.
    fn is_directory<'a>(&'a mut self, path: &'a str, name: &'a str) -> RemoteFuture<'a, bool>;

    /// Whether `path/name` exists.
    fn file_exists<'a>(&'a mut self, path: &'a str, name: &'a str) -> RemoteFuture<'a, bool>;

    /// Size of `path/name` in bytes; `None` if it is absent or the size is unknown.
    fn file_size<'a>(&'a mut self, path: &'a str, name: &'a str)
    -> RemoteFuture<'a, Option<u64>>;

    /// Opens `path/name` for a whole-file write, replacing any existing file.
    fn write_begin<'a>(&'a mut self, path: &'a str, name: &'a str) -> RemoteFuture<'a, ()>;

    /// Appends one chunk to the open write.
    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> RemoteFuture<'a, ()>;

    /// Completes the open write and waits for the remote acknowledgement.
    fn write_end(&mut self) -> RemoteFuture<'_, ()>;

    /// Ends an interrupted write; the remote file may be left incomplete.
    fn write_abort(&mut self) -> RemoteFuture<'_, ()>;

    /// Liveness probe.
    fn ping(&mut self) -> RemoteFuture<'_, ()>;

    /// Best-effort graceful shutdown.
    fn close(&mut self) -> RemoteFuture<'_, ()>;
}

/// Joins a directory path and an entry name with exactly one `/`.
pub fn join_remote_path(path: &str, name: &str) -> String {
    let base = path.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_slashes() {
        assert_eq!(join_remote_path("/data/homebrew/", "G1"), "/data/homebrew/G1");
        assert_eq!(join_remote_path("/data/homebrew", "G1"), "/data/homebrew/G1");
        assert_eq!(join_remote_path("/", "data"), "/data");
        assert_eq!(join_remote_path("/data/homebrew", "/G1"), "/data/homebrew/G1");
    }

    #[test]
    fn only_lost_is_a_session_fault() {
        assert!(RemoteError::Lost("eof".into()).is_session_fault());
        assert!(!RemoteError::Timeout("write".into()).is_session_fault());
        assert!(!RemoteError::Transfer("426".into()).is_session_fault());
        assert!(RemoteError::Unavailable("/mnt/usb1".into()).is_unavailable());
    }
}
