//! Type-safe encoding wrappers
//!
//! Newtypes around encoded data so that base64 text, DER bytes and digests
//! cannot be confused with one another.

use crate::error::{Error, Result};
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Base64-encoded data (standard alphabet)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Base64(String);

impl Base64 {
    /// Wrap an already-encoded string
    ///
    /// Note: This does not validate the base64 encoding.
    /// Use `decode()` to validate and extract bytes.
    pub fn new(s: String) -> Self {
        Base64(s)
    }

    /// Create a Base64 wrapper from raw bytes
    pub fn encode(bytes: &[u8]) -> Self {
        Base64(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Decode the base64 string to bytes
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.0)
            .map_err(|e| Error::InvalidEncoding(format!("invalid base64: {}", e)))
    }

    /// Get the underlying string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the encoded string is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Base64 {
    fn from(s: String) -> Self {
        Base64(s)
    }
}

impl AsRef<str> for Base64 {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Base64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A DER-encoded X.509 certificate
///
/// Serialized as base64 DER. Deserialization also accepts a PEM
/// `CERTIFICATE` block so operators can paste certificates directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerCertificate(Vec<u8>);

impl DerCertificate {
    /// Create from DER bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse a PEM-encoded certificate
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        decode_pem(pem_str, "CERTIFICATE").map(Self)
    }

    /// Get the DER bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the DER bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for DerCertificate {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for DerCertificate {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A DER-encoded SubjectPublicKeyInfo
///
/// Same serialization rules as [`DerCertificate`], with `PUBLIC KEY` as
/// the accepted PEM label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerPublicKey(Vec<u8>);

impl DerPublicKey {
    /// Create from DER bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse a PEM-encoded public key
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        decode_pem(pem_str, "PUBLIC KEY").map(Self)
    }

    /// Get the DER bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for DerPublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for DerPublicKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

fn decode_pem(pem_str: &str, expected_tag: &str) -> Result<Vec<u8>> {
    let parsed = pem::parse(pem_str)
        .map_err(|e| Error::InvalidEncoding(format!("failed to parse PEM: {}", e)))?;
    if parsed.tag() != expected_tag {
        return Err(Error::InvalidEncoding(format!(
            "expected {} PEM block, got {}",
            expected_tag,
            parsed.tag()
        )));
    }
    Ok(parsed.into_contents())
}

/// Decode the textual form used in documents: PEM if it looks like PEM, base64 DER otherwise
fn decode_der_text(text: &str, pem_tag: &str) -> Result<Vec<u8>> {
    if text.trim_start().starts_with("-----BEGIN") {
        decode_pem(text, pem_tag)
    } else {
        Base64::new(text.to_string()).decode()
    }
}

macro_rules! der_text_serde {
    ($ty:ident, $tag:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(Base64::encode(&self.0).as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                let bytes = decode_der_text(&text, $tag).map_err(serde::de::Error::custom)?;
                if bytes.is_empty() {
                    return Err(serde::de::Error::custom(concat!("empty ", $tag)));
                }
                Ok($ty(bytes))
            }
        }
    };
}

der_text_serde!(DerCertificate, "CERTIFICATE");
der_text_serde!(DerPublicKey, "PUBLIC KEY");
