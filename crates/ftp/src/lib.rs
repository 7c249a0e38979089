//! FTP binding for the dump runner deploy engine.
//!
//! Implements [`dumpdeploy_protocol::Connector`] and
//! [`dumpdeploy_protocol::RemoteFs`] over a plain-TCP FTP control
//! connection with passive or active data connections.

mod client;
mod codec;
mod data;
pub mod reply;

pub use client::{FtpClient, FtpConnector};
