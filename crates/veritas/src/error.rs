//! Error types for veritas

use thiserror::Error;

/// Errors that can occur while loading inputs for a verification
#[derive(Error, Debug)]
pub enum Error {
    /// Input file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Types error
    #[error("Types error: {0}")]
    Types(#[from] veritas_types::Error),

    /// Crypto error
    #[error("Crypto error: {0}")]
    Crypto(#[from] veritas_crypto::Error),

    /// Trusted root error
    #[error("Trusted root error: {0}")]
    TrustRoot(#[from] veritas_trust_root::Error),

    /// Timestamp error
    #[error("Timestamp error: {0}")]
    Tsa(#[from] veritas_tsa::Error),

    /// Verifier configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] veritas_verify::ConfigError),
}

/// Result type for veritas operations
pub type Result<T> = std::result::Result<T, Error>;
