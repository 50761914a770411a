//! Signature verification using aws-lc-rs

use crate::error::{Error, Result};
use crate::scheme::SigningScheme;
use aws_lc_rs::signature::{
    UnparsedPublicKey, ECDSA_P256_SHA256_ASN1, ECDSA_P384_SHA384_ASN1, ED25519,
    RSA_PKCS1_2048_8192_SHA256,
};
use der::Decode;
use spki::SubjectPublicKeyInfoOwned;

/// A public key for verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    /// Raw public key bytes (the SPKI `subjectPublicKey` contents)
    pub bytes: Vec<u8>,
    /// The scheme to use for verification
    pub scheme: SigningScheme,
}

impl VerificationKey {
    /// Create a new verification key
    pub fn new(bytes: Vec<u8>, scheme: SigningScheme) -> Self {
        Self { bytes, scheme }
    }

    /// Build a key from a DER-encoded SubjectPublicKeyInfo
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        let spki = SubjectPublicKeyInfoOwned::from_der(der)
            .map_err(|e| Error::InvalidKeyFormat(format!("failed to parse SPKI: {}", e)))?;
        Self::from_spki(&spki)
    }

    /// Build a key from a parsed SubjectPublicKeyInfo
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let scheme = SigningScheme::from_spki(spki)?;
        let bytes = spki.subject_public_key.as_bytes().ok_or_else(|| {
            Error::InvalidKeyFormat("public key bit string has unused bits".to_string())
        })?;
        Ok(Self::new(bytes.to_vec(), scheme))
    }

    /// Build a key from a PEM `PUBLIC KEY` block
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let parsed = pem::parse(pem_str).map_err(|e| Error::Pem(e.to_string()))?;
        if parsed.tag() != "PUBLIC KEY" {
            return Err(Error::Pem(format!(
                "expected PUBLIC KEY PEM block, got {}",
                parsed.tag()
            )));
        }
        Self::from_spki_der(parsed.contents())
    }

    /// Verify a signature over data
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        match self.scheme {
            SigningScheme::EcdsaP256Sha256 => {
                let key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, &self.bytes);
                key.verify(data, signature)
                    .map_err(|_| Error::Verification("ECDSA P-256 signature invalid".to_string()))
            }
            SigningScheme::EcdsaP384Sha384 => {
                let key = UnparsedPublicKey::new(&ECDSA_P384_SHA384_ASN1, &self.bytes);
                key.verify(data, signature)
                    .map_err(|_| Error::Verification("ECDSA P-384 signature invalid".to_string()))
            }
            SigningScheme::Ed25519 => {
                let key = UnparsedPublicKey::new(&ED25519, &self.bytes);
                key.verify(data, signature)
                    .map_err(|_| Error::Verification("Ed25519 signature invalid".to_string()))
            }
            SigningScheme::RsaPkcs1Sha256 => {
                let key = UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, &self.bytes);
                key.verify(data, signature).map_err(|_| {
                    Error::Verification("RSA PKCS#1 SHA-256 signature invalid".to_string())
                })
            }
        }
    }
}

/// Verify a signature with a DER-encoded SubjectPublicKeyInfo
pub fn verify_signature(spki_der: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    VerificationKey::from_spki_der(spki_der)?.verify(data, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_lc_rs::rand::SystemRandom;
    use aws_lc_rs::signature::{EcdsaKeyPair, Ed25519KeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
    use proptest::prelude::*;
    use std::sync::OnceLock;

    struct TestSigner {
        pair: EcdsaKeyPair,
        spki: Vec<u8>,
    }

    impl TestSigner {
        fn sign(&self, data: &[u8]) -> Vec<u8> {
            self.pair
                .sign(&SystemRandom::new(), data)
                .expect("sign")
                .as_ref()
                .to_vec()
        }
    }

    fn signer() -> &'static TestSigner {
        static SIGNER: OnceLock<TestSigner> = OnceLock::new();
        SIGNER.get_or_init(|| {
            let key = rcgen::KeyPair::generate().expect("keygen");
            let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &key.serialize_der())
                .expect("pkcs8");
            TestSigner {
                pair,
                spki: key.public_key_der(),
            }
        })
    }

    #[test]
    fn test_verify_ecdsa_p256_from_spki() {
        let signer = signer();
        let key = VerificationKey::from_spki_der(&signer.spki).unwrap();
        assert_eq!(key.scheme, SigningScheme::EcdsaP256Sha256);

        let sig = signer.sign(b"test data");
        assert!(key.verify(b"test data", &sig).is_ok());
        assert!(key.verify(b"wrong data", &sig).is_err());
    }

    #[test]
    fn test_verify_from_pem() {
        let signer = signer();
        let pem = pem::encode(&pem::Pem::new("PUBLIC KEY", signer.spki.clone()));
        let key = VerificationKey::from_pem(&pem).unwrap();
        assert!(key.verify(b"abc", &signer.sign(b"abc")).is_ok());
    }

    #[test]
    fn test_verify_ed25519() {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let kp = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let sig = kp.sign(b"test data");

        let vk = VerificationKey::new(kp.public_key().as_ref().to_vec(), SigningScheme::Ed25519);
        assert!(vk.verify(b"test data", sig.as_ref()).is_ok());
        assert!(vk.verify(b"test data", &[0u8; 64]).is_err());
    }

    #[test]
    fn test_reject_garbage_spki() {
        assert!(matches!(
            VerificationKey::from_spki_der(&[0x30, 0x00]),
            Err(Error::InvalidKeyFormat(_))
        ));
    }

    proptest! {
        #[test]
        fn flipped_data_byte_fails(
            data in prop::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let signer = signer();
            let sig = signer.sign(&data);
            let mut tampered = data.clone();
            tampered[index.index(data.len())] ^= 1 << bit;
            prop_assert!(verify_signature(&signer.spki, &data, &sig).is_ok());
            prop_assert!(verify_signature(&signer.spki, &tampered, &sig).is_err());
        }

        #[test]
        fn flipped_signature_byte_fails(
            data in prop::collection::vec(any::<u8>(), 0..128),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let signer = signer();
            let mut sig = signer.sign(&data);
            let at = index.index(sig.len());
            sig[at] ^= 1 << bit;
            prop_assert!(verify_signature(&signer.spki, &data, &sig).is_err());
        }
    }
}
