//! Deploys to a volume mounted on this machine instead of over FTP.
//!
//! The console's USB drive can be plugged into a computer and filled
//! directly. [`LocalConnector`] opens a [`LocalFs`] rooted at such a
//! volume, so the scanner and the batch uploader run unchanged on top
//! of plain file I/O. Protocol paths like `/homebrew/G1` resolve below
//! the volume root.

mod fs;
mod volumes;

pub use fs::{LocalConnector, LocalFs};
pub use volumes::{Volume, available_volumes, volumes_under};
