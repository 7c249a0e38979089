use std::time::Duration;

use dumpdeploy_protocol::constants::{
    DEFAULT_PORT, DEFAULT_TIMEOUT_SECS, DEFAULT_USERNAME, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};

use crate::error::SessionError;

/// Connection parameters for one session.
///
/// `port` is wider than `u16` so out-of-range input from settings or
/// the command line is reported by [`validate`](Self::validate) rather
/// than silently truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u32,
    pub username: String,
    pub passive: bool,
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: u32::from(DEFAULT_PORT),
            username: DEFAULT_USERNAME.into(),
            passive: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SessionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Checks every field without touching the network.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.host.trim().is_empty() {
            return Err(SessionError::InvalidConfig("host must not be empty".into()));
        }
        if self.host.chars().any(char::is_whitespace) {
            return Err(SessionError::InvalidConfig(format!(
                "host '{}' contains whitespace",
                self.host
            )));
        }
        if !(1..=u32::from(u16::MAX)).contains(&self.port) {
            return Err(SessionError::InvalidConfig(format!(
                "port {} outside 1-65535",
                self.port
            )));
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(SessionError::InvalidConfig(format!(
                "timeout {}s outside {MIN_TIMEOUT_SECS}-{MAX_TIMEOUT_SECS}s",
                self.timeout_secs
            )));
        }
        if self.username.is_empty() {
            return Err(SessionError::InvalidConfig("username must not be empty".into()));
        }
        Ok(())
    }

    /// Port as a socket port; fails if it is out of range.
    pub fn socket_port(&self) -> Result<u16, SessionError> {
        u16::try_from(self.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| SessionError::InvalidConfig(format!("port {} outside 1-65535", self.port)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
