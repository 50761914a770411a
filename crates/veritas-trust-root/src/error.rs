//! Error types for trust store operations

use thiserror::Error;

/// Errors that can occur while building a trust store
#[derive(Debug, Error)]
pub enum Error {
    /// JSON parsing error
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Trusted root file could not be read
    #[error("failed to read trusted root: {0}")]
    Io(#[from] std::io::Error),

    /// A public key could not be parsed
    #[error("invalid public key {id}: {reason}")]
    InvalidKey { id: String, reason: String },

    /// A certificate could not be used as a trust anchor
    #[error("failed to parse certificate: {0}")]
    Certificate(String),

    /// Two entries share an ID
    #[error("duplicate trust anchor ID: {0}")]
    DuplicateId(String),
}

/// Result type for trust store operations
pub type Result<T> = std::result::Result<T, Error>;
