//! Timestamp token verification
//!
//! This module verifies timestamp counter-signatures including:
//! - Message imprint binding to the counter-signed signature
//! - Token signature verification
//! - TSA certificate chain validation
//! - TSA Extended Key Usage validation
//! - Certificate validity window checks

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use const_oid::ObjectIdentifier;
use rustls_pki_types::{CertificateDer, UnixTime};
use veritas_crypto::{parse_certificate_info, sha256, CertificateInfo};
use veritas_types::{pae, TimestampToken};
use webpki::{anchor_from_trusted_cert, EndEntityCert, KeyUsage, ALL_VERIFICATION_ALGS};

const ID_KP_TIME_STAMPING: ObjectIdentifier = const_oid::db::rfc5280::ID_KP_TIME_STAMPING;

/// Payload type used in the pre-authentication encoding of a timestamp message
pub const TIMESTAMP_PAYLOAD_TYPE: &str = "application/vnd.veritas.timestamp.v1";

/// Verification options for timestamp tokens
#[derive(Debug, Clone, Default)]
pub struct VerifyOpts<'a> {
    /// Root certificate configured for the token's issuer
    pub root: Option<CertificateDer<'a>>,

    /// Validity window the signed time must fall within
    pub cert_valid_for: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl<'a> VerifyOpts<'a> {
    /// Create new verification options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timestamp root
    pub fn with_root(mut self, root: CertificateDer<'a>) -> Self {
        self.root = Some(root);
        self
    }

    /// Require the signed time to fall inside a certificate's validity period
    pub fn with_cert_validity(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.cert_valid_for = Some((not_before, not_after));
        self
    }
}

/// Result of timestamp verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampResult {
    /// The time asserted by the authority
    pub time: DateTime<Utc>,
    /// ID of the root that vouched for the token
    pub issuer_root_id: String,
}

/// Build the message a timestamp authority signs for `signature_bytes` at `signed_time`
pub fn timestamp_message(signed_time: &DateTime<Utc>, signature_bytes: &[u8]) -> Vec<u8> {
    let imprint = hex::encode(sha256(signature_bytes));
    let body = format!(
        "{}\n{}",
        signed_time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        imprint
    );
    pae(TIMESTAMP_PAYLOAD_TYPE, body.as_bytes())
}

/// Verify a timestamp token counter-signing `signature_bytes`.
///
/// The token's own signature is checked first, against the TSA signer
/// certificate (validated up to the configured root) or the root itself
/// when no chain is embedded. Only a cryptographically valid token has
/// its signed time compared with the certificate validity window.
pub fn verify_timestamp_token(
    token: &TimestampToken,
    signature_bytes: &[u8],
    opts: &VerifyOpts<'_>,
) -> Result<TimestampResult> {
    let root = opts
        .root
        .as_ref()
        .ok_or_else(|| Error::UnknownRoot(token.issuer_root_id.clone()))?;

    let token_sig = token
        .token
        .decode()
        .map_err(|e| Error::InvalidToken(format!("token is not valid base64: {}", e)))?;
    if token_sig.is_empty() {
        return Err(Error::InvalidToken("token signature is empty".to_string()));
    }

    tracing::debug!(
        "Verifying timestamp token from {} at {}",
        token.issuer_root_id,
        token.signed_time
    );

    let signer = resolve_signer(token, root)?;

    let message = timestamp_message(&token.signed_time, signature_bytes);
    signer.public_key.verify(&message, &token_sig).map_err(|e| {
        Error::SignatureVerificationError(format!("token signature invalid: {}", e))
    })?;

    if let Some((not_before, not_after)) = opts.cert_valid_for {
        if token.signed_time < not_before || token.signed_time > not_after {
            return Err(Error::OutsideValidityPeriod {
                time: token.signed_time,
                not_before,
                not_after,
            });
        }
    }

    tracing::debug!("Timestamp token verified successfully");

    Ok(TimestampResult {
        time: token.signed_time,
        issuer_root_id: token.issuer_root_id.clone(),
    })
}

/// Find the certificate whose key signed the token
fn resolve_signer(token: &TimestampToken, root: &CertificateDer<'_>) -> Result<CertificateInfo> {
    let Some((signer_der, intermediates)) = token.certificates.split_first() else {
        // The root signs directly and must itself be fit for timestamping
        let info = parse_certificate_info(root.as_ref())?;
        if !info.has_extended_key_usage(&ID_KP_TIME_STAMPING) {
            return Err(Error::InvalidEKU);
        }
        if !info.is_valid_at(token.signed_time.timestamp()) {
            return Err(Error::CertificateValidationError(format!(
                "timestamp root is not valid at {}",
                token.signed_time
            )));
        }
        return Ok(info);
    };

    let intermediate_ders: Vec<CertificateDer<'_>> = intermediates
        .iter()
        .map(|c| CertificateDer::from(c.as_bytes()))
        .collect();
    validate_tsa_certificate_chain(
        signer_der.as_bytes(),
        &intermediate_ders,
        root,
        &token.signed_time,
    )?;

    Ok(parse_certificate_info(signer_der.as_bytes())?)
}

/// Validate the TSA certificate chain
fn validate_tsa_certificate_chain(
    signer_der: &[u8],
    intermediates: &[CertificateDer<'_>],
    root: &CertificateDer<'_>,
    timestamp: &DateTime<Utc>,
) -> Result<()> {
    let signer_der = CertificateDer::from(signer_der);
    let end_entity_cert = EndEntityCert::try_from(&signer_der).map_err(|e| {
        Error::CertificateValidationError(format!("failed to parse TSA signer certificate: {}", e))
    })?;

    let anchor = anchor_from_trusted_cert(root).map_err(|e| {
        Error::CertificateValidationError(format!("failed to create trust anchor: {}", e))
    })?;

    let secs = u64::try_from(timestamp.timestamp()).map_err(|_| {
        Error::CertificateValidationError(format!("timestamp {} predates the epoch", timestamp))
    })?;
    let verification_time = UnixTime::since_unix_epoch(std::time::Duration::from_secs(secs));

    tracing::debug!(
        "Verifying TSA chain with {} intermediate cert(s) at {}",
        intermediates.len(),
        timestamp
    );

    end_entity_cert
        .verify_for_usage(
            ALL_VERIFICATION_ALGS,
            &[anchor],
            intermediates,
            verification_time,
            KeyUsage::required(ID_KP_TIME_STAMPING.as_bytes()),
            None,
            None,
        )
        .map_err(|e| {
            Error::CertificateValidationError(format!(
                "TSA certificate chain validation failed: {}",
                e
            ))
        })?;

    Ok(())
}
