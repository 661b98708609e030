//! Opaque on-device key-value persistence.
//!
//! The device store is an external collaborator: the client only needs
//! get/set by string key. Platform layers supply their own backend; tests
//! and native use get the in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

/// Store key for the last-known username.
pub const KEY_USERNAME: &str = "username";
/// Store key for the full message collection mirror (JSON array).
pub const KEY_MESSAGES: &str = "messages";
/// Store key for the last raw AUTH_SUCCESS payload.
pub const KEY_AUTH_RESPONSE: &str = "auth_response";

/// Opaque string-keyed device storage.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
}

/// In-memory [`LocalStore`] backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), value);
    }
}
