//! Policy document model
//!
//! A policy names the steps of a supply chain, what each step must attest
//! to, who may sign for it, and the trust roots those signers chain to.

use crate::encoding::{DerCertificate, DerPublicKey};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Payload type of a policy envelope
pub const POLICY_PAYLOAD_TYPE: &str = "application/vnd.veritas.policy+json";

/// A parsed policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// The policy must not be used after this instant
    pub expires: DateTime<Utc>,
    /// Step rules keyed by step name, in document order
    pub steps: PolicySteps,
    /// Long-lived public keys keyed by key ID
    #[serde(default)]
    pub public_keys: BTreeMap<String, DerPublicKey>,
    /// Roots for keyless certificate chains
    #[serde(default)]
    pub keyless_roots: Vec<DerCertificate>,
    /// Timestamp authority roots keyed by ID
    #[serde(default)]
    pub timestamp_roots: BTreeMap<String, DerCertificate>,
    /// How many timestamp tokens a keyless signature needs
    #[serde(default)]
    pub timestamp_quorum: TimestampQuorum,
}

/// Requirements for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRule {
    /// Attestation types that must all be present (a minimum, not an exact set)
    #[serde(default)]
    pub required_attestation_types: Vec<String>,
    /// Identities allowed to sign for this step; any one suffices
    pub functionaries: Vec<Functionary>,
    /// The step has no required predecessor
    #[serde(default)]
    pub root: bool,
    /// Upstream steps whose products may satisfy this step's materials
    ///
    /// Empty means every other step is upstream.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts_from: Vec<String>,
}

/// Step rules in the order the policy document lists them
///
/// Serialized as a JSON object. Step names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySteps(Vec<(String, StepRule)>);

type StepEntryRef<'a> = (&'a String, &'a StepRule);

fn entry_ref(entry: &(String, StepRule)) -> StepEntryRef<'_> {
    (&entry.0, &entry.1)
}

impl PolicySteps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step, or replace the rule of an existing step in place
    pub fn insert(&mut self, name: impl Into<String>, rule: StepRule) -> Option<StepRule> {
        let name = name.into();
        match self.get_mut(&name) {
            Some(existing) => Some(std::mem::replace(existing, rule)),
            None => {
                self.0.push((name, rule));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&StepRule> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StepRule> {
        self.0.iter_mut().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Step names in document order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.iter().map(|(n, _)| n)
    }

    /// `(name, rule)` pairs in document order
    pub fn iter(&self) -> impl Iterator<Item = StepEntryRef<'_>> {
        self.0.iter().map(entry_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a PolicySteps {
    type Item = StepEntryRef<'a>;
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, StepRule)>,
        fn(&'a (String, StepRule)) -> StepEntryRef<'a>,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().map(entry_ref as fn(&'a (String, StepRule)) -> StepEntryRef<'a>)
    }
}

impl<K: Into<String>> FromIterator<(K, StepRule)> for PolicySteps {
    fn from_iter<I: IntoIterator<Item = (K, StepRule)>>(iter: I) -> Self {
        let mut steps = PolicySteps::new();
        for (name, rule) in iter {
            steps.insert(name, rule);
        }
        steps
    }
}

impl Serialize for PolicySteps {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for PolicySteps {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StepsVisitor;

        impl<'de> Visitor<'de> for StepsVisitor {
            type Value = PolicySteps;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of step names to step rules")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<PolicySteps, A::Error> {
                let mut steps = PolicySteps::new();
                while let Some((name, rule)) = map.next_entry::<String, StepRule>()? {
                    if steps.contains_key(&name) {
                        return Err(de::Error::custom(format!("duplicate step {}", name)));
                    }
                    steps.0.push((name, rule));
                }
                Ok(steps)
            }
        }

        deserializer.deserialize_map(StepsVisitor)
    }
}

/// An authorized signer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Functionary {
    /// A named long-lived key
    PublicKey {
        /// Key ID in the policy's `publicKeys`
        #[serde(rename = "keyId")]
        key_id: String,
    },
    /// A certificate-constraint pattern for short-lived identities
    Keyless {
        /// Glob constraints on the leaf certificate
        #[serde(rename = "certConstraints", default)]
        cert_constraints: CertConstraints,
    },
}

/// Glob constraints on a keyless leaf certificate
///
/// Each non-empty field must match. An entirely empty set of constraints
/// accepts any identity issued under the keyless roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertConstraints {
    /// Subject common name pattern
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    /// SAN DNS name patterns
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    /// SAN email patterns
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    /// Subject organization patterns
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<String>,
    /// SAN URI patterns
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,
}

impl CertConstraints {
    /// True when no field constrains the identity
    pub fn is_empty(&self) -> bool {
        self.common_name.is_none()
            && self.dns_names.is_empty()
            && self.emails.is_empty()
            && self.organizations.is_empty()
            && self.uris.is_empty()
    }
}

/// How many timestamp tokens on a signature must verify
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimestampQuorum {
    /// At least one token (OR semantics)
    #[default]
    Any,
    /// Every token present
    All,
    /// At least `n` tokens
    AtLeast(usize),
}

impl TimestampQuorum {
    /// Number of verified tokens required when `present` tokens are attached
    pub fn required(&self, present: usize) -> usize {
        match self {
            TimestampQuorum::Any => 1,
            TimestampQuorum::All => present.max(1),
            TimestampQuorum::AtLeast(n) => *n,
        }
    }
}

impl Policy {
    /// Parse a policy from JSON
    pub fn from_json(json: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(json)?)
    }

    /// Parse and validate a policy from an envelope payload
    pub fn from_payload(payload_type: &str, payload: &[u8]) -> Result<Self> {
        if payload_type != POLICY_PAYLOAD_TYPE {
            return Err(Error::UnsupportedPayload(format!(
                "expected payload type {}, got {}",
                POLICY_PAYLOAD_TYPE, payload_type
            )));
        }
        let policy = Self::from_json(payload)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether the policy has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }

    /// Step names in evaluation order
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Check the internal consistency of the document
    ///
    /// Cryptographic material is checked separately when the trust store is
    /// built from the policy.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(invalid("policy defines no steps"));
        }
        if self.timestamp_quorum == TimestampQuorum::AtLeast(0) {
            return Err(invalid("timestampQuorum atLeast must be positive"));
        }

        for (name, rule) in &self.steps {
            if name.is_empty() {
                return Err(invalid("step with empty name"));
            }
            if rule.functionaries.is_empty() {
                return Err(invalid(format!("step {} has no functionaries", name)));
            }
            for functionary in &rule.functionaries {
                match functionary {
                    Functionary::PublicKey { key_id } => {
                        if !self.public_keys.contains_key(key_id) {
                            return Err(invalid(format!(
                                "step {} references unknown key {}",
                                name, key_id
                            )));
                        }
                    }
                    Functionary::Keyless { .. } => {
                        if self.keyless_roots.is_empty() {
                            return Err(invalid(format!(
                                "step {} has a keyless functionary but the policy has no keyless roots",
                                name
                            )));
                        }
                    }
                }
            }
            for upstream in &rule.artifacts_from {
                if upstream == name {
                    return Err(invalid(format!("step {} lists itself in artifactsFrom", name)));
                }
                if !self.steps.contains_key(upstream) {
                    return Err(invalid(format!(
                        "step {} lists unknown step {} in artifactsFrom",
                        name, upstream
                    )));
                }
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidPolicy(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SAMPLE_POLICY: &str = r#"{
        "expires": "2030-01-01T00:00:00Z",
        "steps": {
            "package": {
                "requiredAttestationTypes": ["https://veritas.dev/attestations/material/v0.1"],
                "functionaries": [
                    {"type": "keyless", "certConstraints": {"emails": ["*@example.com"]}}
                ],
                "artifactsFrom": ["build"]
            },
            "build": {
                "requiredAttestationTypes": [
                    "https://veritas.dev/attestations/material/v0.1",
                    "https://veritas.dev/attestations/command-run/v0.1",
                    "https://veritas.dev/attestations/product/v0.1"
                ],
                "functionaries": [{"type": "publicKey", "keyId": "K1"}],
                "root": true
            }
        },
        "publicKeys": {"K1": "MCowBQYDK2VwAyEA"},
        "keylessRoots": ["MAMCAQE="],
        "timestampRoots": {"tsa-1": "MAMCAQE="},
        "timestampQuorum": {"atLeast": 2}
    }"#;

    #[test]
    fn test_parse_policy() {
        let policy = Policy::from_payload(POLICY_PAYLOAD_TYPE, SAMPLE_POLICY.as_bytes()).unwrap();
        assert_eq!(policy.step_names().collect::<Vec<_>>(), vec!["package", "build"]);
        assert!(policy.steps.get("build").unwrap().root);
        assert_eq!(policy.steps.get("package").unwrap().artifacts_from, vec!["build"]);
        assert_eq!(policy.timestamp_quorum, TimestampQuorum::AtLeast(2));
        assert_eq!(
            policy.steps.get("build").unwrap().functionaries[0],
            Functionary::PublicKey {
                key_id: "K1".to_string()
            }
        );
        match &policy.steps.get("package").unwrap().functionaries[0] {
            Functionary::Keyless { cert_constraints } => {
                assert_eq!(cert_constraints.emails, vec!["*@example.com"]);
                assert!(cert_constraints.common_name.is_none());
            }
            other => panic!("unexpected functionary {:?}", other),
        }
    }

    #[test]
    fn test_expiry() {
        let policy = Policy::from_json(SAMPLE_POLICY.as_bytes()).unwrap();
        let before = DateTime::parse_from_rfc3339("2029-12-31T23:59:59Z").unwrap().with_timezone(&Utc);
        let after = DateTime::parse_from_rfc3339("2030-01-01T00:00:01Z").unwrap().with_timezone(&Utc);
        assert!(!policy.is_expired(before));
        assert!(!policy.is_expired(policy.expires));
        assert!(policy.is_expired(after));
    }

    #[rstest]
    #[case::any(TimestampQuorum::Any, 3, 1)]
    #[case::all(TimestampQuorum::All, 3, 3)]
    #[case::all_without_tokens(TimestampQuorum::All, 0, 1)]
    #[case::at_least(TimestampQuorum::AtLeast(2), 3, 2)]
    fn test_quorum(#[case] quorum: TimestampQuorum, #[case] present: usize, #[case] required: usize) {
        assert_eq!(quorum.required(present), required);
    }

    #[test]
    fn test_quorum_json() {
        assert_eq!(serde_json::to_string(&TimestampQuorum::Any).unwrap(), "\"any\"");
        let all: TimestampQuorum = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, TimestampQuorum::All);
    }

    #[test]
    fn test_unknown_key_reference() {
        let mut policy = Policy::from_json(SAMPLE_POLICY.as_bytes()).unwrap();
        policy.public_keys.clear();
        assert!(matches!(policy.validate(), Err(Error::InvalidPolicy(_))));
    }

    #[test]
    fn test_keyless_without_roots() {
        let mut policy = Policy::from_json(SAMPLE_POLICY.as_bytes()).unwrap();
        policy.keyless_roots.clear();
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_unknown_upstream_step() {
        let mut policy = Policy::from_json(SAMPLE_POLICY.as_bytes()).unwrap();
        policy
            .steps
            .get_mut("package")
            .unwrap()
            .artifacts_from
            .push("deploy".to_string());
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_step_without_functionaries() {
        let mut policy = Policy::from_json(SAMPLE_POLICY.as_bytes()).unwrap();
        policy.steps.get_mut("build").unwrap().functionaries.clear();
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_steps_keep_document_order() {
        let policy = Policy::from_json(SAMPLE_POLICY.as_bytes()).unwrap();
        let json = policy.to_json().unwrap();
        assert!(json.find("\"package\"").unwrap() < json.find("\"build\"").unwrap());

        let reparsed = Policy::from_json(json.as_bytes()).unwrap();
        assert_eq!(reparsed.step_names().collect::<Vec<_>>(), vec!["package", "build"]);
        assert_eq!(reparsed, policy);
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let duplicated = r#"{
            "expires": "2030-01-01T00:00:00Z",
            "steps": {
                "build": {"functionaries": [{"type": "publicKey", "keyId": "K1"}]},
                "build": {"functionaries": [{"type": "publicKey", "keyId": "K2"}]}
            },
            "publicKeys": {"K1": "MCowBQYDK2VwAyEA", "K2": "MCowBQYDK2VwAyEA"}
        }"#;
        let err = Policy::from_json(duplicated.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("duplicate step build"));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut policy = Policy::from_json(SAMPLE_POLICY.as_bytes()).unwrap();
        let mut rule = policy.steps.get("package").unwrap().clone();
        rule.root = true;
        assert!(policy.steps.insert("package", rule).is_some());
        assert_eq!(policy.step_names().collect::<Vec<_>>(), vec!["package", "build"]);
        assert!(policy.steps.get("package").unwrap().root);
        assert_eq!(policy.steps.len(), 2);
    }

    #[test]
    fn test_wrong_payload_type() {
        assert!(matches!(
            Policy::from_payload("application/json", SAMPLE_POLICY.as_bytes()),
            Err(Error::UnsupportedPayload(_))
        ));
    }
}
