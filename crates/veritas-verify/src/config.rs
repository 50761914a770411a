//! Verifier configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use veritas_types::{Functionary, TimestampQuorum, ValidationOptions};

/// Default number of provenance rounds walked back from an artifact
pub const DEFAULT_MAX_SEARCH_DEPTH: usize = 16;

/// Errors loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid configuration
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for a verification run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifierConfig {
    /// Upper bound on concurrently evaluated candidates
    pub max_workers: usize,

    /// Cancel the run after this many milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Timestamp quorum for keyless signatures on the policy envelope
    pub policy_timestamp_quorum: TimestampQuorum,

    /// Identities allowed to sign the policy; empty allows any identity the
    /// pinned trust store verifies
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policy_functionaries: Vec<Functionary>,

    /// Rounds of material lookups when collecting envelopes from a source
    pub max_search_depth: usize,

    /// Structural limits applied when decoding envelopes
    pub envelope_limits: ValidationOptions,

    /// Clock override
    #[serde(skip)]
    pub now: Option<DateTime<Utc>>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            timeout_ms: None,
            policy_timestamp_quorum: TimestampQuorum::default(),
            policy_functionaries: Vec::new(),
            max_search_depth: DEFAULT_MAX_SEARCH_DEPTH,
            envelope_limits: ValidationOptions::default(),
            now: None,
        }
    }
}

impl VerifierConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Bound the worker pool
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Cancel the run after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the timestamp quorum for the policy envelope
    pub fn with_policy_timestamp_quorum(mut self, quorum: TimestampQuorum) -> Self {
        self.policy_timestamp_quorum = quorum;
        self
    }

    /// Restrict who may sign the policy
    pub fn with_policy_functionary(mut self, functionary: Functionary) -> Self {
        self.policy_functionaries.push(functionary);
        self
    }

    /// Limit provenance lookups against an envelope source
    pub fn with_max_search_depth(mut self, depth: usize) -> Self {
        self.max_search_depth = depth;
        self
    }

    /// Set envelope decoding limits
    pub fn with_envelope_limits(mut self, limits: ValidationOptions) -> Self {
        self.envelope_limits = limits;
        self
    }

    /// Evaluate expiry and certificate checks at a fixed instant
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Effective worker bound, never zero
    pub fn workers(&self) -> usize {
        self.max_workers.max(1)
    }

    /// Effective run timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The instant the run is evaluated at
    pub fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VerifierConfig::default();
        assert!(config.max_workers >= 1);
        assert_eq!(config.timeout_ms, None);
        assert_eq!(config.max_search_depth, DEFAULT_MAX_SEARCH_DEPTH);
        assert_eq!(config.policy_timestamp_quorum, TimestampQuorum::Any);
    }

    #[test]
    fn test_parse_partial_json() {
        let config = VerifierConfig::from_json(
            r#"{"maxWorkers": 2, "timeoutMs": 500, "policyTimestampQuorum": {"atLeast": 2},
                "envelopeLimits": {"maxSignatures": 4}}"#,
        )
        .unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.policy_timestamp_quorum, TimestampQuorum::AtLeast(2));
        assert_eq!(config.envelope_limits.max_signatures, 4);
        assert_eq!(
            config.envelope_limits.max_payload_bytes,
            ValidationOptions::default().max_payload_bytes
        );
    }

    #[test]
    fn test_policy_functionaries_json() {
        let config = VerifierConfig::from_json(
            r#"{"policyFunctionaries": [{"type": "publicKey", "keyId": "root"}]}"#,
        )
        .unwrap();
        assert_eq!(
            config.policy_functionaries,
            vec![Functionary::PublicKey {
                key_id: "root".to_string()
            }]
        );
    }

    #[test]
    fn test_zero_workers_clamped() {
        assert_eq!(VerifierConfig::new().with_max_workers(0).workers(), 1);
    }

    #[test]
    fn test_unknown_file() {
        assert!(matches!(
            VerifierConfig::from_file("/nonexistent/veritas.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
