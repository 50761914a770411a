//! Policy envelope verification
//!
//! The policy decides which keys and roots are trusted for everything else,
//! so it must verify against out-of-band anchors before it is parsed.

use crate::config::VerifierConfig;
use crate::error::{Error, Result};
use crate::matcher::{functionary_matches, warn_permissive_functionaries};
use crate::signature::{establish_trust, TrustedSignature};
use std::sync::Arc;
use veritas_trust_root::TrustStore;
use veritas_types::{Envelope, Policy};

/// A policy whose envelope verified against pinned anchors
#[derive(Debug, Clone)]
pub struct VerifiedPolicy {
    /// The parsed and validated policy
    pub policy: Policy,
    /// Trust store built from the policy's own roots
    pub trust_store: Arc<TrustStore>,
    /// The signature that vouched for the policy
    pub signer: TrustedSignature,
}

/// Verify a policy envelope against `pinned` anchors.
///
/// Every failure is reported as [`Error::UntrustedPolicy`].
pub fn verify_policy(
    envelope_bytes: &[u8],
    pinned: &TrustStore,
    config: &VerifierConfig,
) -> Result<VerifiedPolicy> {
    let envelope = Envelope::decode_with_options(envelope_bytes, &config.envelope_limits)
        .map_err(|e| untrusted(format!("policy envelope: {}", e)))?;
    let payload = envelope
        .payload_bytes()
        .map_err(|e| untrusted(format!("policy payload: {}", e)))?;
    let message = veritas_types::pae(&envelope.payload_type, &payload);

    let mut failures = Vec::new();
    let mut signer = None;
    for (index, signature) in envelope.signatures.iter().enumerate() {
        match establish_trust(&message, signature, pinned, config.policy_timestamp_quorum) {
            Ok(trusted) if is_policy_signer(config, &trusted) => {
                signer = Some(trusted);
                break;
            }
            Ok(trusted) => failures.push(format!(
                "signature {}: {} may not sign policy",
                index, trusted.identity
            )),
            Err(e) => failures.push(format!("signature {}: {}", index, e)),
        }
    }

    let Some(signer) = signer else {
        tracing::warn!("Rejecting policy envelope: {}", failures.join("; "));
        return Err(untrusted(format!(
            "no policy signature verified: {}",
            failures.join("; ")
        )));
    };

    tracing::debug!("Policy envelope signed by {}", signer.identity);

    let policy = Policy::from_payload(&envelope.payload_type, &payload)
        .map_err(|e| untrusted(e.to_string()))?;
    let trust_store = TrustStore::from_policy(&policy)
        .map_err(|e| untrusted(format!("policy trust roots: {}", e)))?;
    warn_permissive_functionaries(&policy);

    Ok(VerifiedPolicy {
        policy,
        trust_store: Arc::new(trust_store),
        signer,
    })
}

fn is_policy_signer(config: &VerifierConfig, trusted: &TrustedSignature) -> bool {
    config.policy_functionaries.is_empty()
        || config
            .policy_functionaries
            .iter()
            .any(|f| functionary_matches(f, &trusted.identity))
}

fn untrusted(message: String) -> Error {
    Error::UntrustedPolicy(message)
}
