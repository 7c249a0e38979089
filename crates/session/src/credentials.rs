//! Password lookup for a host/user pair.

use std::collections::HashMap;
use std::sync::RwLock;

/// Environment variable read by [`EnvCredentialStore::default`].
pub const PASSWORD_ENV: &str = "DUMPDEPLOY_PASSWORD";

/// Supplies the password for a host and username.
pub trait CredentialStore: Send + Sync {
    fn get_password(&self, host: &str, username: &str) -> Option<String>;
}

/// Reads one password from an environment variable for every host.
#[derive(Debug, Clone)]
pub struct EnvCredentialStore {
    var: String,
}

impl EnvCredentialStore {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new(PASSWORD_ENV)
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get_password(&self, _host: &str, _username: &str) -> Option<String> {
        std::env::var(&self.var).ok()
    }
}

/// In-process store keyed by `(host, username)`.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<(String, String), String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password(&self, host: &str, username: &str, password: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((host.to_string(), username.to_string()), password.to_string());
    }

    pub fn remove(&self, host: &str, username: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(host.to_string(), username.to_string()));
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_password(&self, host: &str, username: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(host.to_string(), username.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_is_keyed_by_host_and_user() {
        let store = MemoryCredentialStore::new();
        store.set_password("192.168.1.20", "anonymous", "pw");

        assert_eq!(
            store.get_password("192.168.1.20", "anonymous").as_deref(),
            Some("pw")
        );
        assert_eq!(store.get_password("192.168.1.21", "anonymous"), None);
        assert_eq!(store.get_password("192.168.1.20", "root"), None);

        store.remove("192.168.1.20", "anonymous");
        assert_eq!(store.get_password("192.168.1.20", "anonymous"), None);
    }

    #[test]
    fn env_store_without_variable_is_empty() {
        let store = EnvCredentialStore::new("DUMPDEPLOY_TEST_UNSET_PASSWORD_VAR");
        assert_eq!(store.get_password("console", "anonymous"), None);
    }
}
