//! Batch deployment of the artifact pair to discovered targets.
//!
//! [`BatchUploader`] runs one [`BatchOperation`] at a time on a leased
//! session, either in place ([`BatchUploader::run`]) or on a background
//! task ([`BatchUploader::submit`]) observed through a [`BatchHandle`].

pub mod error;
pub mod types;
pub mod uploader;

pub use error::DeployError;
pub use types::{
    BatchEvent, BatchOperation, BatchReport, BatchState, BatchSummary, TransferFailure,
    TransferProgress, TransferResult,
};
pub use uploader::{BatchHandle, BatchUploader, DEFAULT_EVENT_CAPACITY};
