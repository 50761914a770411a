//! Envelope signature verification
//!
//! A signature is trusted through exactly one path: a pinned public key
//! named by `keyid`, or a keyless certificate chain that must reach one of
//! the trust store's keyless roots.

use crate::error::{Error, Result};
use crate::timestamp::verify_timestamps;
use chrono::{DateTime, Utc};
use const_oid::db::rfc5280::ID_KP_CODE_SIGNING;
use rustls_pki_types::{CertificateDer, UnixTime};
use serde::Serialize;
use veritas_crypto::{parse_certificate_info, CertificateInfo};
use veritas_trust_root::TrustStore;
use veritas_types::{DerCertificate, Signature, TimestampQuorum, TrustPath};
use webpki::{EndEntityCert, KeyUsage, ALL_VERIFICATION_ALGS};

/// Identity fields of a verified keyless leaf certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeylessIdentity {
    /// Subject common name
    pub common_name: Option<String>,
    /// Subject organizations
    pub organizations: Vec<String>,
    /// SAN DNS names
    pub dns_names: Vec<String>,
    /// SAN emails
    pub emails: Vec<String>,
    /// SAN URIs
    pub uris: Vec<String>,
    /// Leaf validity start
    pub not_before: DateTime<Utc>,
    /// Leaf validity end
    pub not_after: DateTime<Utc>,
}

impl KeylessIdentity {
    fn from_certificate(info: &CertificateInfo) -> Result<Self> {
        Ok(Self {
            common_name: info.common_name.clone(),
            organizations: info.organizations.clone(),
            dns_names: info.dns_names.clone(),
            emails: info.emails.clone(),
            uris: info.uris.clone(),
            not_before: unix_to_datetime(info.not_before)?,
            not_after: unix_to_datetime(info.not_after)?,
        })
    }
}

/// The identity a signature was verified against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VerifiedIdentity {
    /// A pinned long-lived key
    #[serde(rename_all = "camelCase")]
    PublicKey { key_id: String },
    /// A keyless leaf certificate
    Keyless(KeylessIdentity),
}

impl std::fmt::Display for VerifiedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifiedIdentity::PublicKey { key_id } => write!(f, "key {}", key_id),
            VerifiedIdentity::Keyless(id) => {
                let name = id
                    .emails
                    .first()
                    .or(id.uris.first())
                    .or(id.dns_names.first())
                    .or(id.common_name.as_ref())
                    .map(String::as_str)
                    .unwrap_or("<unnamed>");
                write!(f, "keyless {}", name)
            }
        }
    }
}

/// A signature whose trust path and, for keyless signatures, timestamps verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedSignature {
    /// Who signed
    pub identity: VerifiedIdentity,
    /// Earliest verified timestamp, for keyless signatures
    pub signed_time: Option<DateTime<Utc>>,
}

/// Verify `signature` over `message` (the envelope PAE).
///
/// This establishes who signed but does not check timestamps; see
/// [`establish_trust`] for the complete check.
pub fn verify_signature(
    message: &[u8],
    signature: &Signature,
    store: &TrustStore,
) -> Result<VerifiedIdentity> {
    let sig_bytes = signature
        .signature_bytes()
        .map_err(|e| Error::MalformedEnvelope(format!("signature is not valid base64: {}", e)))?;

    match signature.trust_path() {
        Some(TrustPath::PublicKey(key_id)) => {
            tracing::debug!("Verifying signature with pinned key {}", key_id);
            store
                .keyring()
                .verify_with_key_id(key_id, message, &sig_bytes)
                .map_err(|e| match e {
                    veritas_crypto::Error::UnknownKey(id) => Error::UnknownKey(id),
                    e => Error::BadSignature(format!("key {}: {}", key_id, e)),
                })?;
            Ok(VerifiedIdentity::PublicKey {
                key_id: key_id.to_string(),
            })
        }
        Some(TrustPath::Keyless(chain)) => {
            let leaf = verify_keyless_chain(chain, store)?;
            leaf.public_key
                .verify(message, &sig_bytes)
                .map_err(|e| Error::BadSignature(format!("keyless leaf: {}", e)))?;
            Ok(VerifiedIdentity::Keyless(KeylessIdentity::from_certificate(
                &leaf,
            )?))
        }
        None => Err(Error::MalformedEnvelope(
            "signature must name exactly one of keyid or certificateChain".to_string(),
        )),
    }
}

/// Verify a signature and, when it is keyless, its timestamp tokens
pub fn establish_trust(
    message: &[u8],
    signature: &Signature,
    store: &TrustStore,
    quorum: TimestampQuorum,
) -> Result<TrustedSignature> {
    let identity = verify_signature(message, signature, store)?;

    let signed_time = match &identity {
        VerifiedIdentity::Keyless(leaf) => {
            let sig_bytes = signature.signature_bytes()?;
            Some(verify_timestamps(signature, &sig_bytes, leaf, store, quorum)?)
        }
        VerifiedIdentity::PublicKey { .. } => None,
    };

    Ok(TrustedSignature {
        identity,
        signed_time,
    })
}

/// Validate a leaf-first chain against the keyless roots.
///
/// The chain is evaluated at the leaf's issuance time, so every issuer must
/// have been valid when the leaf was minted. The leaf must carry the
/// `codeSigning` extended key usage.
fn verify_keyless_chain(chain: &[DerCertificate], store: &TrustStore) -> Result<CertificateInfo> {
    let Some((leaf_der, intermediates)) = chain.split_first() else {
        return Err(Error::MalformedEnvelope(
            "keyless signature has an empty certificate chain".to_string(),
        ));
    };

    let leaf = parse_certificate_info(leaf_der.as_bytes())
        .map_err(|e| Error::UntrustedChain(format!("failed to parse leaf certificate: {}", e)))?;

    let anchors = store.keyless_anchors();
    if anchors.is_empty() {
        return Err(Error::UntrustedChain("no keyless roots configured".to_string()));
    }

    let leaf_cert_der = CertificateDer::from(leaf_der.as_bytes());
    let end_entity_cert = EndEntityCert::try_from(&leaf_cert_der).map_err(|e| {
        Error::UntrustedChain(format!("failed to parse end-entity certificate: {}", e))
    })?;

    let intermediate_certs: Vec<CertificateDer<'_>> = intermediates
        .iter()
        .map(|c| CertificateDer::from(c.as_bytes()))
        .collect();

    let issued_at = u64::try_from(leaf.not_before)
        .map_err(|_| Error::UntrustedChain("leaf predates the epoch".to_string()))?;
    let verification_time = UnixTime::since_unix_epoch(std::time::Duration::from_secs(issued_at));

    tracing::debug!(
        "Validating keyless chain of {} certificate(s) at leaf issuance {}",
        chain.len(),
        leaf.not_before
    );

    end_entity_cert
        .verify_for_usage(
            ALL_VERIFICATION_ALGS,
            anchors,
            &intermediate_certs,
            verification_time,
            KeyUsage::required(ID_KP_CODE_SIGNING.as_bytes()),
            None,
            None,
        )
        .map_err(|e| {
            tracing::warn!("Rejecting keyless chain: {}", e);
            Error::UntrustedChain(format!("certificate chain validation failed: {}", e))
        })?;

    Ok(leaf)
}

fn unix_to_datetime(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::UntrustedChain(format!("certificate time {} out of range", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_lc_rs::rand::SystemRandom;
    use aws_lc_rs::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
    use veritas_types::DerPublicKey;

    fn signing_key() -> (EcdsaKeyPair, DerPublicKey) {
        let key = rcgen::KeyPair::generate().unwrap();
        let pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &key.serialize_der()).unwrap();
        (pair, DerPublicKey::new(key.public_key_der()))
    }

    fn sign(pair: &EcdsaKeyPair, message: &[u8]) -> Vec<u8> {
        pair.sign(&SystemRandom::new(), message)
            .unwrap()
            .as_ref()
            .to_vec()
    }

    #[test]
    fn test_public_key_path() {
        let (pair, public) = signing_key();
        let store = TrustStore::builder()
            .add_public_key("K1", public)
            .build()
            .unwrap();

        let signature = Signature::with_key("K1", &sign(&pair, b"message"));
        assert_eq!(
            verify_signature(b"message", &signature, &store).unwrap(),
            VerifiedIdentity::PublicKey {
                key_id: "K1".to_string()
            }
        );
        assert!(matches!(
            verify_signature(b"messagf", &signature, &store),
            Err(Error::BadSignature(_))
        ));
    }

    #[test]
    fn test_unknown_key() {
        let (pair, _) = signing_key();
        let signature = Signature::with_key("K9", &sign(&pair, b"message"));
        assert_eq!(
            verify_signature(b"message", &signature, &TrustStore::default()),
            Err(Error::UnknownKey("K9".to_string()))
        );
    }

    #[test]
    fn test_key_missing_from_populated_store() {
        let (pair, public) = signing_key();
        let store = TrustStore::builder()
            .add_public_key("K1", public)
            .build()
            .unwrap();
        let signature = Signature::with_key("K2", &sign(&pair, b"message"));
        assert_eq!(
            verify_signature(b"message", &signature, &store),
            Err(Error::UnknownKey("K2".to_string()))
        );
    }

    #[test]
    fn test_ambiguous_trust_path() {
        let mut signature = Signature::with_key("K1", b"sig");
        signature.certificate_chain = vec![DerCertificate::new(vec![0x30])];
        assert!(matches!(
            verify_signature(b"message", &signature, &TrustStore::default()),
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_keyless_without_roots() {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::default().self_signed(&key).unwrap();
        let signature = Signature::keyless(b"sig", vec![DerCertificate::new(cert.der().to_vec())]);
        assert!(matches!(
            verify_signature(b"message", &signature, &TrustStore::default()),
            Err(Error::UntrustedChain(_))
        ));
    }

    #[test]
    fn test_public_key_signature_has_no_signed_time() {
        let (pair, public) = signing_key();
        let store = TrustStore::builder()
            .add_public_key("K1", public)
            .build()
            .unwrap();
        let signature = Signature::with_key("K1", &sign(&pair, b"m"));
        let trusted = establish_trust(b"m", &signature, &store, TimestampQuorum::Any).unwrap();
        assert_eq!(trusted.signed_time, None);
    }

    #[test]
    fn test_identity_display() {
        let identity = VerifiedIdentity::PublicKey {
            key_id: "K1".to_string(),
        };
        assert_eq!(identity.to_string(), "key K1");
    }
}
