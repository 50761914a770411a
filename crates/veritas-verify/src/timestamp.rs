//! Timestamp quorum evaluation for keyless signatures

use crate::error::{Error, Result};
use crate::signature::KeylessIdentity;
use chrono::{DateTime, Utc};
use veritas_trust_root::TrustStore;
use veritas_tsa::{verify_timestamp_token, VerifyOpts};
use veritas_types::{Signature, TimestampQuorum};

/// Verify the timestamp tokens on a keyless signature.
///
/// Each token must verify against its issuer's root and fall within the
/// leaf certificate's validity. The signature is accepted once `quorum`
/// tokens verify, and the earliest verified time is returned. Otherwise the
/// first token failure is reported.
pub fn verify_timestamps(
    signature: &Signature,
    signature_bytes: &[u8],
    leaf: &KeylessIdentity,
    store: &TrustStore,
    quorum: TimestampQuorum,
) -> Result<DateTime<Utc>> {
    let tokens = &signature.timestamps;
    if tokens.is_empty() {
        tracing::warn!("Keyless signature carries no timestamp tokens");
        return Err(Error::MissingTimestamp);
    }

    let required = quorum.required(tokens.len());
    let mut verified: Vec<DateTime<Utc>> = Vec::new();
    let mut first_error = None;

    for token in tokens {
        let mut opts = VerifyOpts::new().with_cert_validity(leaf.not_before, leaf.not_after);
        if let Some(root) = store.timestamp_root(&token.issuer_root_id) {
            opts = opts.with_root(root.clone());
        }

        match verify_timestamp_token(token, signature_bytes, &opts) {
            Ok(result) => verified.push(result.time),
            Err(err) => {
                tracing::debug!("Timestamp from {} rejected: {}", token.issuer_root_id, err);
                if first_error.is_none() {
                    first_error = Some(map_tsa_error(err));
                }
            }
        }
    }

    tracing::debug!(
        "{} of {} timestamp token(s) verified, {} required",
        verified.len(),
        tokens.len(),
        required
    );

    if verified.len() >= required {
        if let Some(earliest) = verified.iter().min() {
            return Ok(*earliest);
        }
    }

    Err(first_error.unwrap_or(Error::MissingTimestamp))
}

fn map_tsa_error(err: veritas_tsa::Error) -> Error {
    match err {
        veritas_tsa::Error::UnknownRoot(id) => Error::UnknownTsaRoot(id),
        veritas_tsa::Error::OutsideValidityPeriod {
            time,
            not_before,
            not_after,
        } => Error::TimestampOutsideCertValidity {
            signed_time: time,
            not_before,
            not_after,
        },
        other => Error::InvalidTimestampToken(other.to_string()),
    }
}
