//! Error types for veritas-types

use thiserror::Error;

/// Errors that can occur in veritas-types
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid base64, hex or PEM encoding
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Payload type or predicate type is not the one expected
    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),

    /// Envelope structure is structurally invalid
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Policy document is structurally invalid
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),
}

/// Result type for veritas-types operations
pub type Result<T> = std::result::Result<T, Error>;
