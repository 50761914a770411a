//! Out-of-band trusted root document
//!
//! The pinned anchors used to verify a policy envelope travel separately
//! from the policy itself, in the same shape as the policy's own roots.

use crate::error::Result;
use crate::store::TrustStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use veritas_types::{DerCertificate, DerPublicKey};

/// Anchors trusted to sign policies
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedRoot {
    /// Public keys keyed by key ID
    #[serde(default)]
    pub public_keys: BTreeMap<String, DerPublicKey>,

    /// Keyless root certificates
    #[serde(default)]
    pub keyless_roots: Vec<DerCertificate>,

    /// Timestamp authority roots keyed by ID
    #[serde(default)]
    pub timestamp_roots: BTreeMap<String, DerCertificate>,
}

impl TrustedRoot {
    /// Parse a trusted root from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a trusted root from a file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse every anchor into a trust store
    pub fn to_trust_store(&self) -> Result<TrustStore> {
        let mut builder = TrustStore::builder();
        for (id, key) in &self.public_keys {
            builder = builder.add_public_key(id.clone(), key.clone());
        }
        for root in &self.keyless_roots {
            builder = builder.add_keyless_root(root.clone());
        }
        for (id, root) in &self.timestamp_roots {
            builder = builder.add_timestamp_root(id.clone(), root.clone());
        }
        builder.build()
    }
}
