//! Envelope structural validation
//!
//! Checks run at decode time, before any cryptography. A failure here is
//! always a [`Error::MalformedEnvelope`].

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default upper bound on decoded payload size (16 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Default upper bound on signatures per envelope
pub const DEFAULT_MAX_SIGNATURES: usize = 16;

/// Validation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOptions {
    /// Largest accepted decoded payload
    pub max_payload_bytes: usize,
    /// Largest accepted number of signatures
    pub max_signatures: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_signatures: DEFAULT_MAX_SIGNATURES,
        }
    }
}

/// Validate an envelope with default options
pub fn validate_envelope(envelope: &Envelope) -> Result<()> {
    validate_envelope_with_options(envelope, &ValidationOptions::default())
}

/// Validate an envelope with custom options
pub fn validate_envelope_with_options(envelope: &Envelope, options: &ValidationOptions) -> Result<()> {
    if envelope.payload_type.is_empty() {
        return Err(malformed("payloadType is empty"));
    }

    let payload = envelope
        .payload_bytes()
        .map_err(|e| malformed(format!("payload: {}", e)))?;
    if payload.len() > options.max_payload_bytes {
        return Err(malformed(format!(
            "payload is {} bytes, limit is {}",
            payload.len(),
            options.max_payload_bytes
        )));
    }

    if envelope.signatures.is_empty() {
        return Err(malformed("envelope has no signatures"));
    }
    if envelope.signatures.len() > options.max_signatures {
        return Err(malformed(format!(
            "envelope has {} signatures, limit is {}",
            envelope.signatures.len(),
            options.max_signatures
        )));
    }

    for (index, signature) in envelope.signatures.iter().enumerate() {
        let bytes = signature
            .signature_bytes()
            .map_err(|e| malformed(format!("signature {}: {}", index, e)))?;
        if bytes.is_empty() {
            return Err(malformed(format!("signature {} is empty", index)));
        }

        if signature.trust_path().is_none() {
            return Err(malformed(format!(
                "signature {} must name exactly one of keyid or certificateChain",
                index
            )));
        }

        for token in &signature.timestamps {
            if token.issuer_root_id.is_empty() {
                return Err(malformed(format!(
                    "signature {}: timestamp token without issuerRootId",
                    index
                )));
            }
            let token_bytes = token
                .token
                .decode()
                .map_err(|e| malformed(format!("signature {}: timestamp token: {}", index, e)))?;
            if token_bytes.is_empty() {
                return Err(malformed(format!(
                    "signature {}: timestamp token is empty",
                    index
                )));
            }
        }
    }

    Ok(())
}

fn malformed(message: impl Into<String>) -> Error {
    Error::MalformedEnvelope(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{Base64, DerCertificate};
    use crate::envelope::{Signature, TimestampToken};

    fn keyed_envelope() -> Envelope {
        Envelope::new("application/json", b"{}", vec![Signature::with_key("K1", b"sig")])
    }

    #[test]
    fn test_valid_envelope() {
        assert!(validate_envelope(&keyed_envelope()).is_ok());
    }

    #[test]
    fn test_unparseable_bytes() {
        let err = Envelope::decode(b"{not json").unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }

    #[test]
    fn test_no_signatures() {
        let mut envelope = keyed_envelope();
        envelope.signatures.clear();
        assert!(matches!(
            validate_envelope(&envelope),
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_bad_payload_encoding() {
        let mut envelope = keyed_envelope();
        envelope.payload = Base64::new("%%%".to_string());
        assert!(validate_envelope(&envelope).is_err());
    }

    #[test]
    fn test_ambiguous_trust_path() {
        let mut envelope = keyed_envelope();
        envelope.signatures[0].certificate_chain = vec![DerCertificate::new(vec![0x30])];
        let err = validate_envelope(&envelope).unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_empty_timestamp_issuer() {
        let mut envelope = keyed_envelope();
        envelope.signatures[0].timestamps.push(TimestampToken {
            issuer_root_id: String::new(),
            signed_time: chrono::Utc::now(),
            token: Base64::encode(b"t"),
            certificates: Vec::new(),
        });
        assert!(validate_envelope(&envelope).is_err());
    }

    #[test]
    fn test_limits() {
        let options = ValidationOptions {
            max_payload_bytes: 1,
            ..Default::default()
        };
        assert!(validate_envelope_with_options(&keyed_envelope(), &options).is_err());

        let mut envelope = keyed_envelope();
        envelope.signatures = vec![Signature::with_key("K1", b"sig"); 3];
        let options = ValidationOptions {
            max_signatures: 2,
            ..Default::default()
        };
        assert!(validate_envelope_with_options(&envelope, &options).is_err());
    }
}
