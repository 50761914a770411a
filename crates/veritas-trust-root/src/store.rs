//! Immutable store of trust anchors
//!
//! Every key and certificate is parsed once when the store is built, so
//! verification never re-parses anchors and the store can be shared across
//! worker tasks behind an `Arc`.

use crate::error::{Error, Result};
use rustls_pki_types::{CertificateDer, TrustAnchor};
use std::collections::BTreeMap;
use veritas_crypto::{parse_certificate_info, Keyring, VerificationKey};
use veritas_types::{DerCertificate, DerPublicKey, Policy};
use webpki::anchor_from_trusted_cert;

/// Pinned public keys, keyless roots and timestamp roots
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    keyring: Keyring,
    keyless_roots: Vec<CertificateDer<'static>>,
    keyless_anchors: Vec<TrustAnchor<'static>>,
    timestamp_roots: BTreeMap<String, CertificateDer<'static>>,
}

impl TrustStore {
    /// Start building a store
    pub fn builder() -> TrustStoreBuilder {
        TrustStoreBuilder::default()
    }

    /// Build a store from the trust roots embedded in a policy
    pub fn from_policy(policy: &Policy) -> Result<Self> {
        let mut builder = Self::builder();
        for (id, key) in &policy.public_keys {
            builder = builder.add_public_key(id.clone(), key.clone());
        }
        for root in &policy.keyless_roots {
            builder = builder.add_keyless_root(root.clone());
        }
        for (id, root) in &policy.timestamp_roots {
            builder = builder.add_timestamp_root(id.clone(), root.clone());
        }
        builder.build()
    }

    /// Pinned public keys
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Look up a pinned public key
    pub fn public_key(&self, key_id: &str) -> Option<&VerificationKey> {
        self.keyring.get_key(key_id)
    }

    /// Keyless root certificates
    pub fn keyless_roots(&self) -> &[CertificateDer<'static>] {
        &self.keyless_roots
    }

    /// Keyless roots as webpki trust anchors
    pub fn keyless_anchors(&self) -> &[TrustAnchor<'static>] {
        &self.keyless_anchors
    }

    /// Look up a timestamp root
    pub fn timestamp_root(&self, id: &str) -> Option<&CertificateDer<'static>> {
        self.timestamp_roots.get(id)
    }

    /// IDs of all timestamp roots in sorted order
    pub fn timestamp_root_ids(&self) -> impl Iterator<Item = &str> {
        self.timestamp_roots.keys().map(String::as_str)
    }

    /// True when the store holds no anchors at all
    pub fn is_empty(&self) -> bool {
        self.keyring.is_empty() && self.keyless_roots.is_empty() && self.timestamp_roots.is_empty()
    }
}

/// Collects raw anchors and parses them into a [`TrustStore`]
#[derive(Debug, Clone, Default)]
pub struct TrustStoreBuilder {
    public_keys: Vec<(String, DerPublicKey)>,
    keyless_roots: Vec<DerCertificate>,
    timestamp_roots: Vec<(String, DerCertificate)>,
}

impl TrustStoreBuilder {
    /// Add a pinned public key (DER SubjectPublicKeyInfo)
    pub fn add_public_key(mut self, id: impl Into<String>, key: DerPublicKey) -> Self {
        self.public_keys.push((id.into(), key));
        self
    }

    /// Add a keyless root certificate
    pub fn add_keyless_root(mut self, cert: DerCertificate) -> Self {
        self.keyless_roots.push(cert);
        self
    }

    /// Add a timestamp authority root certificate
    pub fn add_timestamp_root(mut self, id: impl Into<String>, cert: DerCertificate) -> Self {
        self.timestamp_roots.push((id.into(), cert));
        self
    }

    /// Parse every anchor and build the store
    pub fn build(self) -> Result<TrustStore> {
        let mut keyring = Keyring::new();
        for (id, key) in self.public_keys {
            if keyring.get_key(&id).is_some() {
                return Err(Error::DuplicateId(id));
            }
            let vk = VerificationKey::from_spki_der(key.as_bytes()).map_err(|e| {
                Error::InvalidKey {
                    id: id.clone(),
                    reason: e.to_string(),
                }
            })?;
            keyring.add_key(id, vk);
        }

        let mut keyless_roots = Vec::with_capacity(self.keyless_roots.len());
        let mut keyless_anchors = Vec::with_capacity(self.keyless_roots.len());
        for cert in self.keyless_roots {
            let der = CertificateDer::from(cert.into_bytes());
            let anchor = anchor_from_trusted_cert(&der)
                .map_err(|e| Error::Certificate(format!("invalid keyless root: {}", e)))?
                .to_owned();
            keyless_anchors.push(anchor);
            keyless_roots.push(der);
        }

        let mut timestamp_roots = BTreeMap::new();
        for (id, cert) in self.timestamp_roots {
            parse_certificate_info(cert.as_bytes()).map_err(|e| {
                Error::Certificate(format!("invalid timestamp root {}: {}", id, e))
            })?;
            if timestamp_roots
                .insert(id.clone(), CertificateDer::from(cert.into_bytes()))
                .is_some()
            {
                return Err(Error::DuplicateId(id));
            }
        }

        tracing::trace!("Pinned key IDs: {:?}", keyring.key_ids());
        tracing::debug!(
            "Built trust store with {} key(s), {} keyless root(s), {} timestamp root(s)",
            keyring.len(),
            keyless_roots.len(),
            timestamp_roots.len()
        );

        Ok(TrustStore {
            keyring,
            keyless_roots,
            keyless_anchors,
            timestamp_roots,
        })
    }
}
