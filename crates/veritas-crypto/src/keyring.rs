//! Keyring of named verification keys

use crate::error::{Error, Result};
use crate::verification::VerificationKey;
use std::collections::HashMap;

/// Verification keys indexed by key ID
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: HashMap<String, VerificationKey>,
}

impl Keyring {
    /// Create a new empty keyring
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key, replacing any key already registered under `key_id`
    pub fn add_key(&mut self, key_id: impl Into<String>, key: VerificationKey) {
        self.keys.insert(key_id.into(), key);
    }

    /// Get a key by ID
    pub fn get_key(&self, key_id: &str) -> Option<&VerificationKey> {
        self.keys.get(key_id)
    }

    /// Verify a signature using a specific key ID
    pub fn verify_with_key_id(&self, key_id: &str, data: &[u8], signature: &[u8]) -> Result<()> {
        let key = self
            .get_key(key_id)
            .ok_or_else(|| Error::UnknownKey(key_id.to_string()))?;
        key.verify(data, signature)
    }

    /// Key IDs in sorted order
    pub fn key_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Get the number of keys in the keyring
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the keyring is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
