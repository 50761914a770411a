//! Cryptographic primitives for veritas
//!
//! Signature verification, X.509 identity extraction and hashing, using
//! aws-lc-rs as the cryptographic backend.

pub mod error;
pub mod hash;
pub mod keyring;
pub mod scheme;
pub mod verification;
pub mod x509;

pub use error::{Error, Result};
pub use hash::sha256;
pub use keyring::Keyring;
pub use scheme::SigningScheme;
pub use verification::{verify_signature, VerificationKey};
pub use x509::{parse_certificate_info, CertificateInfo};
