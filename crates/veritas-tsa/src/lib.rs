//! Timestamp counter-signature verification for veritas
//!
//! A timestamp token binds one envelope signature to a time asserted by a
//! timestamp authority. Verification checks the token signature, the
//! authority's certificate chain and `timeStamping` usage, and optionally
//! that the asserted time falls inside a certificate validity window.

pub mod error;
pub mod verify;

pub use error::{Error, Result};
pub use verify::{
    timestamp_message, verify_timestamp_token, TimestampResult, VerifyOpts,
    TIMESTAMP_PAYLOAD_TYPE,
};
