//! Policy step matching
//!
//! Decides whether a verified signer is an allowed functionary for a step
//! and whether a collection carries every required attestation type.

use crate::error::Error;
use crate::signature::{KeylessIdentity, VerifiedIdentity};
use veritas_types::{CertConstraints, Collection, Functionary, Policy, StepRule};

/// Check a collection and its verified signer against a step rule.
///
/// Returns every failure rather than the first one.
pub fn satisfies_step(
    rule: &StepRule,
    collection: &Collection,
    identity: &VerifiedIdentity,
) -> std::result::Result<(), Vec<Error>> {
    let mut errors = Vec::new();

    if !is_functionary(rule, identity) {
        errors.push(Error::FunctionaryMismatch(identity.to_string()));
    }
    errors.extend(
        missing_attestation_types(rule, collection)
            .into_iter()
            .map(Error::MissingAttestationType),
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Whether `identity` matches any functionary of the step
pub fn is_functionary(rule: &StepRule, identity: &VerifiedIdentity) -> bool {
    rule.functionaries
        .iter()
        .any(|f| functionary_matches(f, identity))
}

/// Required types absent from the collection, in policy order
pub fn missing_attestation_types(rule: &StepRule, collection: &Collection) -> Vec<String> {
    rule.required_attestation_types
        .iter()
        .filter(|t| !collection.has_type(t))
        .cloned()
        .collect()
}

/// Match a single functionary
pub fn functionary_matches(functionary: &Functionary, identity: &VerifiedIdentity) -> bool {
    match (functionary, identity) {
        (Functionary::PublicKey { key_id }, VerifiedIdentity::PublicKey { key_id: signer }) => {
            key_id == signer
        }
        (Functionary::Keyless { cert_constraints }, VerifiedIdentity::Keyless(leaf)) => {
            constraints_match(cert_constraints, leaf)
        }
        _ => false,
    }
}

/// Match keyless constraints against a leaf identity.
///
/// A constrained field needs at least one value on the leaf; every leaf
/// value must match some pattern and every pattern must match some value.
/// Unconstrained fields are ignored.
pub fn constraints_match(constraints: &CertConstraints, leaf: &KeylessIdentity) -> bool {
    if let Some(pattern) = &constraints.common_name {
        match &leaf.common_name {
            Some(cn) if glob_match(pattern, cn) => {}
            _ => return false,
        }
    }

    field_matches(&constraints.dns_names, &leaf.dns_names)
        && field_matches(&constraints.emails, &leaf.emails)
        && field_matches(&constraints.organizations, &leaf.organizations)
        && field_matches(&constraints.uris, &leaf.uris)
}

fn field_matches(patterns: &[String], values: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    if values.is_empty() {
        return false;
    }
    values
        .iter()
        .all(|v| patterns.iter().any(|p| glob_match(p, v)))
        && patterns
            .iter()
            .all(|p| values.iter().any(|v| glob_match(p, v)))
}

/// Glob match where `*` matches any run of characters and `?` exactly one
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    let mut text_idx = 0;
    let mut pat_idx = 0;
    let mut last_star: Option<usize> = None;
    let mut match_after_star = 0;

    while text_idx < t.len() {
        if pat_idx < p.len() && (p[pat_idx] == '?' || p[pat_idx] == t[text_idx]) {
            text_idx += 1;
            pat_idx += 1;
        } else if pat_idx < p.len() && p[pat_idx] == '*' {
            last_star = Some(pat_idx);
            match_after_star = text_idx;
            pat_idx += 1;
        } else if let Some(star) = last_star {
            pat_idx = star + 1;
            match_after_star += 1;
            text_idx = match_after_star;
        } else {
            return false;
        }
    }

    while pat_idx < p.len() && p[pat_idx] == '*' {
        pat_idx += 1;
    }

    pat_idx == p.len()
}

/// Log a warning for every keyless functionary that accepts any identity
pub fn warn_permissive_functionaries(policy: &Policy) {
    for (name, rule) in &policy.steps {
        for functionary in &rule.functionaries {
            if let Functionary::Keyless { cert_constraints } = functionary {
                if cert_constraints.is_empty() {
                    tracing::warn!(
                        "Step {} has an unconstrained keyless functionary; any identity under the keyless roots may sign it",
                        name
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use veritas_types::{Attestation, COMMAND_RUN_TYPE, MATERIAL_TYPE, PRODUCT_TYPE};

    fn leaf(emails: &[&str]) -> KeylessIdentity {
        KeylessIdentity {
            common_name: Some("builder".to_string()),
            organizations: vec!["Example".to_string()],
            dns_names: Vec::new(),
            emails: emails.iter().map(|e| e.to_string()).collect(),
            uris: Vec::new(),
            not_before: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            not_after: Utc.with_ymd_and_hms(2026, 1, 1, 0, 10, 0).unwrap(),
        }
    }

    fn email_constraint(patterns: &[&str]) -> CertConstraints {
        CertConstraints {
            emails: patterns.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case("hello", "hello", true)]
    #[case("*", "anything", true)]
    #[case("*", "", true)]
    #[case("*@example.com", "dev@example.com", true)]
    #[case("*@example.com", "dev@other.com", false)]
    #[case("*@example.com", "dev@example.com.evil", false)]
    #[case("t?st", "test", true)]
    #[case("t?st", "tst", false)]
    #[case("dev@*.example.com", "dev@ci.example.com", true)]
    #[case("Dev@example.com", "dev@example.com", false)]
    #[case("?", "é", true)]
    fn test_glob(#[case] pattern: &str, #[case] text: &str, #[case] expected: bool) {
        assert_eq!(glob_match(pattern, text), expected);
    }

    #[rstest]
    #[case(&["*@example.com"], &["dev@example.com"], true)]
    #[case(&["*@example.com"], &["dev@other.com"], false)]
    #[case(&["*@example.com"], &[], false)]
    #[case(&["*@example.com"], &["dev@example.com", "dev@other.com"], false)]
    #[case(&["a@example.com", "b@example.com"], &["a@example.com"], false)]
    #[case(&["a@example.com", "b@example.com"], &["a@example.com", "b@example.com"], true)]
    fn test_email_constraints(
        #[case] patterns: &[&str],
        #[case] emails: &[&str],
        #[case] expected: bool,
    ) {
        assert_eq!(
            constraints_match(&email_constraint(patterns), &leaf(emails)),
            expected
        );
    }

    #[test]
    fn test_empty_constraints_match_anything() {
        assert!(constraints_match(&CertConstraints::default(), &leaf(&[])));
    }

    #[test]
    fn test_common_name_constraint() {
        let constraints = CertConstraints {
            common_name: Some("build*".to_string()),
            ..Default::default()
        };
        assert!(constraints_match(&constraints, &leaf(&[])));

        let mut unnamed = leaf(&[]);
        unnamed.common_name = None;
        assert!(!constraints_match(&constraints, &unnamed));
    }

    #[test]
    fn test_kind_mismatch() {
        let keyless = Functionary::Keyless {
            cert_constraints: CertConstraints::default(),
        };
        let by_key = VerifiedIdentity::PublicKey {
            key_id: "K1".to_string(),
        };
        assert!(!functionary_matches(&keyless, &by_key));

        let key_functionary = Functionary::PublicKey {
            key_id: "K1".to_string(),
        };
        assert!(functionary_matches(&key_functionary, &by_key));
        assert!(!functionary_matches(
            &key_functionary,
            &VerifiedIdentity::Keyless(leaf(&["dev@example.com"]))
        ));
    }

    #[test]
    fn test_satisfies_step_collects_all_failures() {
        let rule = StepRule {
            required_attestation_types: vec![
                MATERIAL_TYPE.to_string(),
                COMMAND_RUN_TYPE.to_string(),
                PRODUCT_TYPE.to_string(),
            ],
            functionaries: vec![Functionary::PublicKey {
                key_id: "K1".to_string(),
            }],
            root: true,
            artifacts_from: Vec::new(),
        };
        let collection = Collection::new(
            "build",
            vec![Attestation::new(MATERIAL_TYPE, Vec::new())],
        );
        let identity = VerifiedIdentity::PublicKey {
            key_id: "K2".to_string(),
        };

        let errors = satisfies_step(&rule, &collection, &identity).unwrap_err();
        assert_eq!(
            errors,
            vec![
                Error::FunctionaryMismatch("key K2".to_string()),
                Error::MissingAttestationType(COMMAND_RUN_TYPE.to_string()),
                Error::MissingAttestationType(PRODUCT_TYPE.to_string()),
            ]
        );
    }

    #[test]
    fn test_extra_types_tolerated() {
        let rule = StepRule {
            required_attestation_types: vec![MATERIAL_TYPE.to_string()],
            functionaries: vec![Functionary::PublicKey {
                key_id: "K1".to_string(),
            }],
            root: true,
            artifacts_from: Vec::new(),
        };
        let collection = Collection::new(
            "build",
            vec![
                Attestation::new(MATERIAL_TYPE, Vec::new()),
                Attestation::new("https://example.com/custom/v1", Vec::new()),
            ],
        );
        let identity = VerifiedIdentity::PublicKey {
            key_id: "K1".to_string(),
        };
        assert!(satisfies_step(&rule, &collection, &identity).is_ok());
    }

    proptest::proptest! {
        #[test]
        fn prop_literal_pattern_matches_itself(text in "[a-z@.]{0,24}") {
            proptest::prop_assert!(glob_match(&text, &text));
        }

        #[test]
        fn prop_star_wraps_any_infix(
            prefix in "[a-z]{0,8}",
            infix in "[a-z@.]{0,16}",
            suffix in "[a-z]{0,8}",
        ) {
            let pattern = format!("{}*{}", prefix, suffix);
            let text = format!("{}{}{}", prefix, infix, suffix);
            proptest::prop_assert!(glob_match(&pattern, &text));
        }
    }
}
