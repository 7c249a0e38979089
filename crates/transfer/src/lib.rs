//! Local side of a deploy: the artifact pair, chunked reads, checksums,
//! the official-install fingerprint and progress plumbing.

mod artifact;
mod chunked;
mod fingerprint;
mod progress;
mod resolver;

use std::path::PathBuf;

use dumpdeploy_protocol::ArtifactKind;

pub use artifact::{ArtifactPair, ArtifactSource};
pub use chunked::{ChunkReader, calculate_file_checksum};
pub use fingerprint::{ArtifactProbe, OfficialFingerprint, classify_installation};
pub use progress::{ProgressChannel, SpeedCalculator, percent};
pub use resolver::{LocalReleaseResolver, ReleaseResolver, ResolveFuture};

/// Default chunk size: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest chunk size accepted from configuration.
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} artifact {path:?} rejected: {reason}")]
    InvalidArtifact {
        kind: ArtifactKind,
        path: PathBuf,
        reason: String,
    },
}
