//! Signing schemes and their detection from SubjectPublicKeyInfo

use crate::error::{Error, Result};
use const_oid::db::rfc5912::{ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1};
use const_oid::db::rfc8410::ID_ED_25519;
use const_oid::ObjectIdentifier;
use spki::SubjectPublicKeyInfoOwned;

/// Supported signing schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningScheme {
    /// ECDSA P-256 with SHA-256
    EcdsaP256Sha256,
    /// ECDSA P-384 with SHA-384
    EcdsaP384Sha384,
    /// Ed25519
    Ed25519,
    /// RSA PKCS#1 v1.5 with SHA-256
    RsaPkcs1Sha256,
}

impl SigningScheme {
    /// Get the name of this scheme
    pub fn name(&self) -> &'static str {
        match self {
            SigningScheme::EcdsaP256Sha256 => "ECDSA_P256_SHA256",
            SigningScheme::EcdsaP384Sha384 => "ECDSA_P384_SHA384",
            SigningScheme::Ed25519 => "ED25519",
            SigningScheme::RsaPkcs1Sha256 => "RSA_PKCS1_SHA256",
        }
    }

    /// Determine the scheme from a SubjectPublicKeyInfo
    ///
    /// Keys with an unrecognized algorithm or curve are rejected.
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let alg_oid = spki.algorithm.oid;

        if alg_oid == ID_EC_PUBLIC_KEY {
            let params = spki.algorithm.parameters.as_ref().ok_or_else(|| {
                Error::InvalidKeyFormat("EC key missing curve parameters".to_string())
            })?;
            // params.value() is the raw OID content (without tag/length)
            let curve_oid = ObjectIdentifier::from_bytes(params.value()).map_err(|e| {
                Error::InvalidKeyFormat(format!("failed to parse EC curve OID: {}", e))
            })?;

            if curve_oid == SECP_256_R_1 {
                Ok(SigningScheme::EcdsaP256Sha256)
            } else if curve_oid == SECP_384_R_1 {
                Ok(SigningScheme::EcdsaP384Sha384)
            } else {
                tracing::warn!("Rejecting key on unsupported EC curve {}", curve_oid);
                Err(Error::UnsupportedAlgorithm(format!("EC curve {}", curve_oid)))
            }
        } else if alg_oid == RSA_ENCRYPTION {
            // Padding cannot be read from the key itself
            Ok(SigningScheme::RsaPkcs1Sha256)
        } else if alg_oid == ID_ED_25519 {
            Ok(SigningScheme::Ed25519)
        } else {
            tracing::warn!("Rejecting key with unsupported algorithm {}", alg_oid);
            Err(Error::UnsupportedAlgorithm(format!(
                "public key algorithm {}",
                alg_oid
            )))
        }
    }
}

impl std::fmt::Display for SigningScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
