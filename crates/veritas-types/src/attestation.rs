//! Attestation and collection types
//!
//! A collection is the set of attestations recorded for one build step by one
//! signer. It travels as the predicate of an in-toto Statement whose subjects
//! are the collection's products.
//!
//! Statement specification: https://github.com/in-toto/attestation/blob/main/spec/v1/statement.md

use crate::digest::DigestSet;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Payload type of an in-toto Statement
pub const INTOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";
/// `_type` of an in-toto Statement v1
pub const STATEMENT_TYPE_V1: &str = "https://in-toto.io/Statement/v1";
/// Predicate type of an attestation collection
pub const COLLECTION_PREDICATE_TYPE: &str = "https://veritas.dev/attestation-collection/v0.1";

/// Material (input) attestation type
pub const MATERIAL_TYPE: &str = "https://veritas.dev/attestations/material/v0.1";
/// Command-run attestation type
pub const COMMAND_RUN_TYPE: &str = "https://veritas.dev/attestations/command-run/v0.1";
/// Product (output) attestation type
pub const PRODUCT_TYPE: &str = "https://veritas.dev/attestations/product/v0.1";
/// SBOM attestation type
pub const SBOM_TYPE: &str = "https://veritas.dev/attestations/sbom/v0.1";
/// Secret-scan attestation type
pub const SECRET_SCAN_TYPE: &str = "https://veritas.dev/attestations/secretscan/v0.1";
/// SLSA provenance attestation type
pub const SLSA_TYPE: &str = "https://veritas.dev/attestations/slsa/v0.1";
/// VEX attestation type
pub const VEX_TYPE: &str = "https://veritas.dev/attestations/vex/v0.1";

/// In-toto Statement v1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    /// Type identifier for the statement (typically "https://in-toto.io/Statement/v1")
    #[serde(rename = "_type")]
    pub type_: String,
    /// Subjects (artifacts) being attested about
    #[serde(default)]
    pub subject: Vec<Subject>,
    /// Type of the predicate
    pub predicate_type: String,
    /// The attestation content (format depends on predicate_type)
    #[serde(default)]
    pub predicate: serde_json::Value,
}

/// An artifact identified by name and content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject {
    /// Name of the artifact (e.g., file path, package name)
    pub name: String,
    /// Cryptographic digest(s) of the artifact
    pub digest: DigestSet,
}

impl Subject {
    /// Create a new subject
    pub fn new(name: impl Into<String>, digest: DigestSet) -> Self {
        Self {
            name: name.into(),
            digest,
        }
    }
}

/// The closed set of attestation kinds the engine knows about
///
/// Dispatch happens on this tag. Unknown type URIs map to `Other` and are
/// carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationKind {
    /// Input digests
    Material,
    /// Command line, exit code and output digests
    CommandRun,
    /// Output digests
    Product,
    /// Software bill of materials
    Sbom,
    /// Secret scan results
    SecretScan,
    /// SLSA provenance
    Slsa,
    /// Vulnerability exploitability exchange
    Vex,
    /// Any other type
    Other,
}

impl AttestationKind {
    /// Classify an attestation type URI
    pub fn from_type(type_uri: &str) -> Self {
        match type_uri {
            MATERIAL_TYPE => AttestationKind::Material,
            COMMAND_RUN_TYPE => AttestationKind::CommandRun,
            PRODUCT_TYPE => AttestationKind::Product,
            SBOM_TYPE => AttestationKind::Sbom,
            SECRET_SCAN_TYPE => AttestationKind::SecretScan,
            SLSA_TYPE => AttestationKind::Slsa,
            VEX_TYPE => AttestationKind::Vex,
            _ => AttestationKind::Other,
        }
    }
}

/// A typed claim about a set of subjects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Attestation type URI
    #[serde(rename = "type")]
    pub type_: String,
    /// Subjects the claim is about
    #[serde(default)]
    pub subjects: Vec<Subject>,
    /// Type-specific content, opaque to the engine
    #[serde(default)]
    pub predicate: serde_json::Value,
}

impl Attestation {
    /// Create an attestation with an empty predicate
    pub fn new(type_: impl Into<String>, subjects: Vec<Subject>) -> Self {
        Self {
            type_: type_.into(),
            subjects,
            predicate: serde_json::Value::Null,
        }
    }

    /// The kind of this attestation
    pub fn kind(&self) -> AttestationKind {
        AttestationKind::from_type(&self.type_)
    }
}

/// All attestations recorded for one step by one signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Name of the step this collection attests to
    pub name: String,
    /// Attestations in recording order
    #[serde(default)]
    pub attestations: Vec<Attestation>,
}

impl Collection {
    /// Create a new collection
    pub fn new(name: impl Into<String>, attestations: Vec<Attestation>) -> Self {
        Self {
            name: name.into(),
            attestations,
        }
    }

    /// Parse a collection from an envelope payload
    pub fn from_payload(payload_type: &str, payload: &[u8]) -> Result<Self> {
        if payload_type != INTOTO_PAYLOAD_TYPE {
            return Err(Error::UnsupportedPayload(format!(
                "expected payload type {}, got {}",
                INTOTO_PAYLOAD_TYPE, payload_type
            )));
        }
        let statement: Statement = serde_json::from_slice(payload)?;
        Self::from_statement(statement)
    }

    /// Extract the collection predicate of a statement
    pub fn from_statement(statement: Statement) -> Result<Self> {
        if statement.predicate_type != COLLECTION_PREDICATE_TYPE {
            return Err(Error::UnsupportedPayload(format!(
                "expected predicate type {}, got {}",
                COLLECTION_PREDICATE_TYPE, statement.predicate_type
            )));
        }
        let collection: Collection = serde_json::from_value(statement.predicate)?;
        if collection.name.is_empty() {
            return Err(Error::MissingField("name".to_string()));
        }
        Ok(collection)
    }

    /// Wrap this collection in a statement whose subjects are its products
    pub fn to_statement(&self) -> Result<Statement> {
        Ok(Statement {
            type_: STATEMENT_TYPE_V1.to_string(),
            subject: self.products().cloned().collect(),
            predicate_type: COLLECTION_PREDICATE_TYPE.to_string(),
            predicate: serde_json::to_value(self)?,
        })
    }

    /// Check if an attestation of the given type is present
    pub fn has_type(&self, type_uri: &str) -> bool {
        self.attestations.iter().any(|a| a.type_ == type_uri)
    }

    /// Subjects of all material attestations
    pub fn materials(&self) -> impl Iterator<Item = &Subject> {
        self.subjects_of(AttestationKind::Material)
    }

    /// Subjects of all product attestations
    pub fn products(&self) -> impl Iterator<Item = &Subject> {
        self.subjects_of(AttestationKind::Product)
    }

    fn subjects_of(&self, kind: AttestationKind) -> impl Iterator<Item = &Subject> {
        self.attestations
            .iter()
            .filter(move |a| a.kind() == kind)
            .flat_map(|a| a.subjects.iter())
    }
}
