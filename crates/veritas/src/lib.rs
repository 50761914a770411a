//! Supply-chain attestation and policy verification
//!
//! This is the main entry point for veritas. It re-exports the component
//! crates and adds file-based helpers around [`Verifier`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use veritas::{load_verifier, verify_files, CancellationToken, VerifyPaths};
//!
//! # async fn example() -> Result<(), veritas::Error> {
//! let verifier = load_verifier(Path::new("trusted_root.json"), None)?;
//! let paths = VerifyPaths::new("policy.json")
//!     .with_envelope("build.json")
//!     .with_envelope("package.json");
//!
//! let verdict = verify_files(&verifier, &paths, &CancellationToken::new()).await?;
//! println!("{}", verdict.to_json().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod verify;

// Re-export core crates
pub use veritas_crypto as crypto;
pub use veritas_trust_root as trust_root;
pub use veritas_tsa as tsa;
pub use veritas_types as types;
pub use veritas_verify as verifier;

pub use error::{Error, Result};
pub use verify::{load_verifier, verify_files, VerifyPaths};
pub use veritas_trust_root::{TrustStore, TrustedRoot};
pub use veritas_verify::{
    CancellationToken, Decision, Reason, VerificationRequest, Verdict, Verifier, VerifierConfig,
};
