//! Shared vocabulary for deploying the dump runner artifact pair.
//!
//! - [`remote`]: the capability set every transfer protocol binding
//!   implements (`RemoteFs`, `Connector`) and its error type.
//! - [`types`]: discovered targets, their location and install status.
//! - [`constants`]: fixed artifact names, candidate roots and defaults.
//! - `memory` (feature `memory`): in-memory `RemoteFs` with fault injection.

pub mod constants;
#[cfg(feature = "memory")]
pub mod memory;
pub mod remote;
pub mod types;

pub use constants::{CandidateRoot, candidate_roots, local_volume_roots};
pub use remote::{Connector, RemoteError, RemoteFs, RemoteFuture, join_remote_path};
pub use types::{ArtifactKind, InstallationStatus, Location, Target};
