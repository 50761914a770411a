//! Verification error taxonomy
//!
//! These errors are values inside a [`Verdict`](crate::Verdict): they are
//! collected per step rather than propagated, so they are `Clone` and
//! comparable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Reasons a verification run, step or candidate can fail
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum Error {
    /// Envelope or payload could not be decoded
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The policy envelope itself did not verify
    #[error("untrusted policy: {0}")]
    UntrustedPolicy(String),

    /// The policy is past its expiry
    #[error("policy expired at {expires} (now {now})")]
    PolicyExpired {
        expires: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Signature names a key the trust store does not hold
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// Signature does not verify
    #[error("bad signature: {0}")]
    BadSignature(String),

    /// Keyless certificate chain does not reach a trusted root
    #[error("untrusted certificate chain: {0}")]
    UntrustedChain(String),

    /// Timestamp token names a root the trust store does not hold
    #[error("unknown timestamp root: {0}")]
    UnknownTsaRoot(String),

    /// Timestamp falls outside the signing certificate's validity
    #[error("timestamp {signed_time} outside certificate validity [{not_before}, {not_after}]")]
    TimestampOutsideCertValidity {
        signed_time: DateTime<Utc>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    },

    /// Keyless signature carries no timestamp tokens
    #[error("keyless signature has no timestamp")]
    MissingTimestamp,

    /// Timestamp token signature or authority chain is invalid
    #[error("invalid timestamp token: {0}")]
    InvalidTimestampToken(String),

    /// No collection was supplied for a policy step
    #[error("no collection for step {0}")]
    MissingStep(String),

    /// Collection lacks a required attestation type
    #[error("missing attestation type {0}")]
    MissingAttestationType(String),

    /// Verified signer is not an allowed functionary
    #[error("signer {0} is not an allowed functionary")]
    FunctionaryMismatch(String),

    /// Materials do not link to upstream products
    #[error("broken provenance chain at {step}: {detail}")]
    BrokenChain { step: String, detail: String },

    /// The requested artifact is not a product of any accepted step
    #[error("artifact {0} not found among accepted products")]
    ArtifactNotFound(String),

    /// The run was cancelled or timed out
    #[error("verification incomplete")]
    Incomplete,
}

/// Result type for verification operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<veritas_types::Error> for Error {
    fn from(err: veritas_types::Error) -> Self {
        Error::MalformedEnvelope(err.to_string())
    }
}
