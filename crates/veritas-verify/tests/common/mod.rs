//! Shared fixtures: generated keys, certificate hierarchies and envelopes
#![allow(dead_code)]

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use chrono::{DateTime, TimeZone, Utc};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SanType,
};
use std::collections::BTreeMap;
use veritas_trust_root::TrustStore;
use veritas_tsa::timestamp_message;
use veritas_types::{
    pae, Attestation, Base64, Collection, DerCertificate, DerPublicKey, DigestSet, Envelope,
    Functionary, Policy, Signature, StepRule, Subject, TimestampQuorum, TimestampToken,
    COMMAND_RUN_TYPE, INTOTO_PAYLOAD_TYPE, MATERIAL_TYPE, POLICY_PAYLOAD_TYPE, PRODUCT_TYPE,
};
use veritas_verify::VerifierConfig;

/// 2025-01-01T00:00:00Z
pub const CA_NOT_BEFORE: i64 = 1_735_689_600;
/// 2035-01-01T00:00:00Z
pub const CA_NOT_AFTER: i64 = 2_051_222_400;
/// 2026-01-01T00:00:00Z
pub const LEAF_NOT_BEFORE: i64 = 1_767_225_600;
/// Ten minutes of leaf validity
pub const LEAF_NOT_AFTER: i64 = LEAF_NOT_BEFORE + 600;

pub const POLICY_KEY_ID: &str = "policy-root";

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Evaluation instant well after every leaf has expired
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
}

pub fn config() -> VerifierConfig {
    VerifierConfig::default().with_now(now())
}

fn window(params: &mut CertificateParams, not_before: i64, not_after: i64) {
    params.not_before = time::OffsetDateTime::from_unix_timestamp(not_before).unwrap();
    params.not_after = time::OffsetDateTime::from_unix_timestamp(not_after).unwrap();
}

fn ecdsa(key: &KeyPair) -> EcdsaKeyPair {
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &key.serialize_der()).unwrap()
}

fn sign_with(key: &KeyPair, message: &[u8]) -> Vec<u8> {
    ecdsa(key)
        .sign(&SystemRandom::new(), message)
        .unwrap()
        .as_ref()
        .to_vec()
}

/// A long-lived signing key
pub struct KeySigner {
    pub key_id: String,
    key: KeyPair,
}

impl KeySigner {
    pub fn new(key_id: &str) -> Self {
        Self {
            key_id: key_id.to_string(),
            key: KeyPair::generate().unwrap(),
        }
    }

    pub fn public_key(&self) -> DerPublicKey {
        DerPublicKey::new(self.key.public_key_der())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        sign_with(&self.key, message)
    }

    pub fn signature(&self, message: &[u8]) -> Signature {
        Signature::with_key(self.key_id.clone(), &self.sign(message))
    }
}

/// A certificate authority for keyless or timestamp certificates
pub struct Authority {
    cert: Certificate,
    key: KeyPair,
}

impl Authority {
    pub fn root(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        window(&mut params, CA_NOT_BEFORE, CA_NOT_AFTER);
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    /// An intermediate issued by this authority with the given validity
    pub fn intermediate(&self, name: &str, not_before: i64, not_after: i64) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        window(&mut params, not_before, not_after);
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        Self { cert, key }
    }

    pub fn der(&self) -> DerCertificate {
        DerCertificate::new(self.cert.der().to_vec())
    }

    /// Issue a short-lived code-signing leaf for `email`
    pub fn issue_leaf(&self, email: &str) -> Leaf {
        self.issue_leaf_with(email, LEAF_NOT_BEFORE, LEAF_NOT_AFTER)
    }

    pub fn issue_leaf_with(&self, email: &str, not_before: i64, not_after: i64) -> Leaf {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, "keyless signer");
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::CodeSigning];
        params.subject_alt_names = vec![SanType::Rfc822Name(email.try_into().unwrap())];
        window(&mut params, not_before, not_after);
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        Leaf {
            chain: vec![DerCertificate::new(cert.der().to_vec())],
            key,
        }
    }

    /// Issue a timestamping certificate and wrap it as an authority
    pub fn timestamp_authority(&self, id: &str) -> Tsa {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, "timestamp signer");
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::TimeStamping];
        window(&mut params, CA_NOT_BEFORE, CA_NOT_AFTER);
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        Tsa {
            id: id.to_string(),
            root: self.der(),
            signer: DerCertificate::new(cert.der().to_vec()),
            key,
        }
    }
}

/// A keyless leaf with its chain (leaf first)
pub struct Leaf {
    pub chain: Vec<DerCertificate>,
    key: KeyPair,
}

impl Leaf {
    /// Append an issuer certificate to the chain
    pub fn with_intermediate(mut self, intermediate: &Authority) -> Self {
        self.chain.push(intermediate.der());
        self
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        sign_with(&self.key, message)
    }
}

/// A timestamp authority with a dedicated signing certificate
pub struct Tsa {
    pub id: String,
    pub root: DerCertificate,
    signer: DerCertificate,
    key: KeyPair,
}

impl Tsa {
    pub fn stamp(&self, signature: &[u8], signed_time: DateTime<Utc>) -> TimestampToken {
        let message = timestamp_message(&signed_time, signature);
        TimestampToken {
            issuer_root_id: self.id.clone(),
            signed_time,
            token: Base64::encode(&sign_with(&self.key, &message)),
            certificates: vec![self.signer.clone()],
        }
    }
}

pub fn subject(name: &str, hex: &str) -> Subject {
    Subject::new(name, DigestSet::sha256(hex))
}

/// Collection with material, command-run and product attestations
pub fn build_collection(step: &str, materials: Vec<Subject>, products: Vec<Subject>) -> Collection {
    Collection::new(
        step,
        vec![
            Attestation::new(MATERIAL_TYPE, materials),
            Attestation::new(COMMAND_RUN_TYPE, Vec::new()),
            Attestation::new(PRODUCT_TYPE, products),
        ],
    )
}

pub fn statement_payload(collection: &Collection) -> Vec<u8> {
    serde_json::to_vec(&collection.to_statement().unwrap()).unwrap()
}

/// Envelope bytes for `payload` signed by each of `signers`
pub fn signed_envelope(payload_type: &str, payload: &[u8], signers: &[&KeySigner]) -> Vec<u8> {
    let message = pae(payload_type, payload);
    let signatures = signers.iter().map(|s| s.signature(&message)).collect();
    Envelope::new(payload_type, payload, signatures)
        .to_json()
        .unwrap()
        .into_bytes()
}

pub fn key_envelope(collection: &Collection, signer: &KeySigner) -> Vec<u8> {
    signed_envelope(INTOTO_PAYLOAD_TYPE, &statement_payload(collection), &[signer])
}

/// Keyless envelope counter-signed by each `(tsa, signed_time)`
pub fn keyless_envelope(
    collection: &Collection,
    leaf: &Leaf,
    stamps: &[(&Tsa, DateTime<Utc>)],
) -> Vec<u8> {
    let payload = statement_payload(collection);
    let sig = leaf.sign(&pae(INTOTO_PAYLOAD_TYPE, &payload));
    let mut signature = Signature::keyless(&sig, leaf.chain.clone());
    for (tsa, time) in stamps {
        signature = signature.with_timestamp(tsa.stamp(&sig, *time));
    }
    Envelope::new(INTOTO_PAYLOAD_TYPE, &payload, vec![signature])
        .to_json()
        .unwrap()
        .into_bytes()
}

pub fn key_rule(key_id: &str, types: &[&str], root: bool) -> StepRule {
    StepRule {
        required_attestation_types: types.iter().map(|t| t.to_string()).collect(),
        functionaries: vec![Functionary::PublicKey {
            key_id: key_id.to_string(),
        }],
        root,
        artifacts_from: Vec::new(),
    }
}

pub fn keyless_rule(emails: &[&str], types: &[&str], root: bool) -> StepRule {
    StepRule {
        required_attestation_types: types.iter().map(|t| t.to_string()).collect(),
        functionaries: vec![Functionary::Keyless {
            cert_constraints: veritas_types::CertConstraints {
                emails: emails.iter().map(|e| e.to_string()).collect(),
                ..Default::default()
            },
        }],
        root,
        artifacts_from: Vec::new(),
    }
}

pub fn policy(steps: Vec<(&str, StepRule)>, keys: &[&KeySigner]) -> Policy {
    Policy {
        expires: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        steps: steps
            .into_iter()
            .map(|(name, rule)| (name.to_string(), rule))
            .collect(),
        public_keys: keys
            .iter()
            .map(|k| (k.key_id.clone(), k.public_key()))
            .collect(),
        keyless_roots: Vec::new(),
        timestamp_roots: BTreeMap::new(),
        timestamp_quorum: TimestampQuorum::Any,
    }
}

/// Policy envelope bytes signed by the policy root key
pub fn policy_envelope(policy: &Policy, root: &KeySigner) -> Vec<u8> {
    let payload = serde_json::to_vec(policy).unwrap();
    signed_envelope(POLICY_PAYLOAD_TYPE, &payload, &[root])
}

/// Pinned store trusting `root` to sign policies
pub fn pinned_store(root: &KeySigner) -> TrustStore {
    TrustStore::builder()
        .add_public_key(root.key_id.clone(), root.public_key())
        .build()
        .unwrap()
}
