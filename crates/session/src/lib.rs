//! Lifecycle of the single stateful remote session.
//!
//! [`SessionManager`] validates a [`SessionConfig`], opens and
//! authenticates the session through a [`dumpdeploy_protocol::Connector`],
//! publishes [`SessionState`] changes, and hands out exclusive
//! [`SessionLease`]s to the scanner and uploader.

pub mod config;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod types;

pub use config::SessionConfig;
pub use credentials::{CredentialStore, EnvCredentialStore, MemoryCredentialStore};
pub use error::SessionError;
pub use manager::{SessionLease, SessionManager};
pub use types::{SessionInfo, SessionState};
