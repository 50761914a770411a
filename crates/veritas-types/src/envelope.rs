//! Signed envelope types
//!
//! The envelope follows the DSSE layout: a typed payload plus one or more
//! signatures over its Pre-Authentication Encoding. Each signature names its
//! trust path (a pinned key ID or a keyless certificate chain) and may carry
//! timestamp counter-signatures.
//!
//! DSSE specification: https://github.com/secure-systems-lab/dsse

use crate::encoding::{Base64, DerCertificate};
use crate::error::{Error, Result};
use crate::validation::{validate_envelope_with_options, ValidationOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A signed envelope wrapping a policy or attestation collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Type URI of the payload
    pub payload_type: String,
    /// Base64-encoded payload
    pub payload: Base64,
    /// Signatures over the PAE (Pre-Authentication Encoding)
    pub signatures: Vec<Signature>,
}

/// A signature in an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// ID of a long-lived key in the trust store
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keyid: String,
    /// Base64-encoded signature
    pub sig: Base64,
    /// Keyless signing certificate chain, leaf first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_chain: Vec<DerCertificate>,
    /// Timestamp counter-signatures over `sig`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timestamps: Vec<TimestampToken>,
}

/// Which trust path a signature declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustPath<'a> {
    /// Verified against a pinned public key
    PublicKey(&'a str),
    /// Verified against a certificate chain ending at a keyless root
    Keyless(&'a [DerCertificate]),
}

/// A timestamp authority counter-signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampToken {
    /// ID of the timestamp root in the trust store
    pub issuer_root_id: String,
    /// Time asserted by the authority
    pub signed_time: DateTime<Utc>,
    /// Authority signature over the timestamp message
    pub token: Base64,
    /// TSA signing chain, signer first; empty when the root signs directly
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<DerCertificate>,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(payload_type: impl Into<String>, payload: &[u8], signatures: Vec<Signature>) -> Self {
        Self {
            payload_type: payload_type.into(),
            payload: Base64::encode(payload),
            signatures,
        }
    }

    /// Decode and structurally validate an envelope with default limits
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with_options(bytes, &ValidationOptions::default())
    }

    /// Decode and structurally validate an envelope
    ///
    /// Every failure is reported as [`Error::MalformedEnvelope`].
    pub fn decode_with_options(bytes: &[u8], options: &ValidationOptions) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedEnvelope(format!("unparseable envelope: {}", e)))?;
        validate_envelope_with_options(&envelope, options)?;
        Ok(envelope)
    }

    /// Serialize to JSON
    ///
    /// Field order is fixed, so the output for a given envelope is stable.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the payload exactly as signed
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        self.payload.decode()
    }

    /// Get the Pre-Authentication Encoding of the decoded payload
    pub fn pae(&self) -> Result<Vec<u8>> {
        Ok(pae(&self.payload_type, &self.payload_bytes()?))
    }
}

impl Signature {
    /// Signature with a pinned key ID
    pub fn with_key(keyid: impl Into<String>, sig: &[u8]) -> Self {
        Self {
            keyid: keyid.into(),
            sig: Base64::encode(sig),
            certificate_chain: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    /// Keyless signature carrying its certificate chain
    pub fn keyless(sig: &[u8], certificate_chain: Vec<DerCertificate>) -> Self {
        Self {
            keyid: String::new(),
            sig: Base64::encode(sig),
            certificate_chain,
            timestamps: Vec::new(),
        }
    }

    /// Attach a timestamp counter-signature
    pub fn with_timestamp(mut self, token: TimestampToken) -> Self {
        self.timestamps.push(token);
        self
    }

    /// Decode the signature bytes
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        self.sig.decode()
    }

    /// The declared trust path, or `None` if it is ambiguous
    pub fn trust_path(&self) -> Option<TrustPath<'_>> {
        match (self.keyid.is_empty(), self.certificate_chain.is_empty()) {
            (false, true) => Some(TrustPath::PublicKey(&self.keyid)),
            (true, false) => Some(TrustPath::Keyless(&self.certificate_chain)),
            _ => None,
        }
    }
}

/// Compute the Pre-Authentication Encoding (PAE)
///
/// Format: `DSSEv1 <len(type)> <type> <len(body)> <body>`
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(payload_type.len() + payload.len() + 32);

    result.extend_from_slice(b"DSSEv1 ");
    result.extend_from_slice(format!("{} ", payload_type.len()).as_bytes());
    result.extend_from_slice(payload_type.as_bytes());
    result.push(b' ');
    result.extend_from_slice(format!("{} ", payload.len()).as_bytes());
    result.extend_from_slice(payload);

    result
}
