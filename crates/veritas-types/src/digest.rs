//! Content digests keyed by algorithm name
//!
//! Subjects identify artifacts by one or more `{algorithm: hex}` pairs.
//! Algorithm identifiers are lowercase names such as `sha256`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// SHA2-256 algorithm identifier
pub const SHA256: &str = "sha256";
/// SHA2-384 algorithm identifier
pub const SHA384: &str = "sha384";
/// SHA2-512 algorithm identifier
pub const SHA512: &str = "sha512";
/// SHA-1 algorithm identifier (checked when shared, never sufficient alone)
pub const SHA1: &str = "sha1";

/// A set of digests of one artifact, keyed by algorithm
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestSet(BTreeMap<String, String>);

impl DigestSet {
    /// Create an empty digest set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a digest set holding a single SHA-256 digest
    pub fn sha256(hex_digest: impl Into<String>) -> Self {
        let mut set = Self::new();
        set.insert(SHA256, hex_digest);
        set
    }

    /// Add a digest, replacing any previous value for the algorithm
    pub fn insert(&mut self, algorithm: impl Into<String>, hex_digest: impl Into<String>) {
        self.0.insert(algorithm.into(), hex_digest.into());
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, algorithm: impl Into<String>, hex_digest: impl Into<String>) -> Self {
        self.insert(algorithm, hex_digest);
        self
    }

    /// Get the digest for an algorithm
    pub fn get(&self, algorithm: &str) -> Option<&str> {
        self.0.get(algorithm).map(String::as_str)
    }

    /// Iterate over `(algorithm, hex)` pairs in algorithm order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of algorithms present
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no digest is present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether two digest sets identify the same content
    ///
    /// The sets must share at least one collision-resistant algorithm (any
    /// but `sha1`) and agree on every algorithm they share. Hex comparison
    /// ignores ASCII case.
    pub fn matches(&self, other: &DigestSet) -> bool {
        let mut shared_strong = 0usize;
        for (algorithm, value) in self.iter() {
            if let Some(theirs) = other.get(algorithm) {
                if !value.eq_ignore_ascii_case(theirs) {
                    return false;
                }
                if algorithm != SHA1 {
                    shared_strong += 1;
                }
            }
        }
        shared_strong > 0
    }
}

impl std::fmt::Display for DigestSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (algorithm, value) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", algorithm, value)?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DigestSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        DigestSet(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
