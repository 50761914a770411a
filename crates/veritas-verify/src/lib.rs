//! Attestation policy verification for veritas
//!
//! This crate decides whether a set of signed attestation collections
//! satisfies a signed policy:
//!
//! 1. The policy envelope is verified against pinned anchors
//! 2. Each candidate collection's signatures are verified through a pinned
//!    key or a keyless certificate chain with timestamp counter-signatures
//! 3. Signers are matched against the step's functionaries and required
//!    attestation types are checked
//! 4. Accepted steps are linked by product and material digests
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use veritas_trust_root::TrustedRoot;
//! use veritas_verify::{VerificationRequest, Verifier, VerifierConfig};
//!
//! # async fn example(policy: Vec<u8>, envelopes: Vec<Vec<u8>>) -> Result<(), Box<dyn std::error::Error>> {
//! let pinned = TrustedRoot::from_file("trusted_root.json")?.to_trust_store()?;
//! let verifier = Verifier::new(pinned, VerifierConfig::default());
//!
//! let request = VerificationRequest::new(policy).with_envelopes(envelopes);
//! let verdict = verifier.verify(&request, &CancellationToken::new()).await;
//! if !verdict.is_accepted() {
//!     for reason in &verdict.reasons {
//!         eprintln!("{:?}: {}", reason.step, reason.error);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod linker;
pub mod matcher;
pub mod policy;
pub mod report;
pub mod signature;
pub mod source;
pub mod timestamp;
pub mod verifier;

pub use config::{ConfigError, VerifierConfig, DEFAULT_MAX_SEARCH_DEPTH};
pub use error::{Error, Result};
pub use linker::{
    link, locate_artifact, AcceptedCollections, LinkedChain, ProvenanceEdge, ProvenanceGraph,
};
pub use matcher::{constraints_match, functionary_matches, glob_match, satisfies_step};
pub use policy::{verify_policy, VerifiedPolicy};
pub use report::{
    CandidateOutcome, CandidateReport, Decision, Reason, SkippedEnvelope, StepReport, StepState,
    Verdict,
};
pub use signature::{
    establish_trust, verify_signature, KeylessIdentity, TrustedSignature, VerifiedIdentity,
};
pub use source::{EnvelopeSource, InMemoryEnvelopeSource, SourceError};
pub use timestamp::verify_timestamps;
pub use verifier::{StepObserver, VerificationRequest, Verifier};
pub use tokio_util::sync::CancellationToken;
