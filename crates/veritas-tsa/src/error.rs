//! Error types for veritas-tsa

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur in timestamp verification
#[derive(Error, Debug)]
pub enum Error {
    /// No timestamp root is configured under the token's issuer ID
    #[error("Unknown timestamp root: {0}")]
    UnknownRoot(String),

    /// Token is structurally unusable
    #[error("Invalid timestamp token: {0}")]
    InvalidToken(String),

    /// Failed to verify the token signature
    #[error("Failed to verify timestamp signature: {0}")]
    SignatureVerificationError(String),

    /// Signer certificate does not have TimeStamping EKU
    #[error("Signer certificate does not have TimeStamping Extended Key Usage")]
    InvalidEKU,

    /// Signed time is outside the counter-signed certificate's validity period
    #[error("Timestamp {time} is outside validity period [{not_before}, {not_after}]")]
    OutsideValidityPeriod {
        time: DateTime<Utc>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    },

    /// TSA certificate validation failed
    #[error("TSA certificate validation failed: {0}")]
    CertificateValidationError(String),

    /// Certificate could not be parsed
    #[error("Certificate error: {0}")]
    Certificate(#[from] veritas_crypto::Error),
}

/// Result type for timestamp operations
pub type Result<T> = std::result::Result<T, Error>;
