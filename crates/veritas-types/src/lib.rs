//! Core types and data structures for veritas
//!
//! This crate provides the data model shared by the verification engine:
//! signed envelopes, attestation collections, digest sets and policy
//! documents, together with the structural checks applied when decoding them.

pub mod attestation;
pub mod digest;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod policy;
pub mod validation;

pub use attestation::{
    Attestation, AttestationKind, Collection, Statement, Subject, COLLECTION_PREDICATE_TYPE,
    COMMAND_RUN_TYPE, INTOTO_PAYLOAD_TYPE, MATERIAL_TYPE, PRODUCT_TYPE, SBOM_TYPE,
    SECRET_SCAN_TYPE, SLSA_TYPE, STATEMENT_TYPE_V1, VEX_TYPE,
};
pub use digest::DigestSet;
pub use encoding::{Base64, DerCertificate, DerPublicKey};
pub use envelope::{pae, Envelope, Signature, TimestampToken, TrustPath};
pub use error::{Error, Result};
pub use policy::{
    CertConstraints, Functionary, Policy, PolicySteps, StepRule, TimestampQuorum,
    POLICY_PAYLOAD_TYPE,
};
pub use validation::{validate_envelope, validate_envelope_with_options, ValidationOptions};
