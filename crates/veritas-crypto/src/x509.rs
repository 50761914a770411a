//! X.509 certificate utilities
//!
//! Extracts the identity fields that policy functionary constraints are
//! matched against, along with validity, extended key usages and the
//! subject public key.

use crate::error::{Error, Result};
use crate::verification::VerificationKey;
use const_oid::ObjectIdentifier;
use der::{Decode, Tag, Tagged};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{ExtendedKeyUsage, SubjectAltName};
use x509_cert::Certificate;

/// Subject commonName: 2.5.4.3
const COMMON_NAME_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
/// Subject organizationName: 2.5.4.10
const ORGANIZATION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");

/// Information extracted from a certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Subject commonName, if present
    pub common_name: Option<String>,
    /// Subject organizationName values
    pub organizations: Vec<String>,
    /// SAN dNSName entries
    pub dns_names: Vec<String>,
    /// SAN rfc822Name entries
    pub emails: Vec<String>,
    /// SAN uniformResourceIdentifier entries
    pub uris: Vec<String>,
    /// Not valid before (Unix timestamp)
    pub not_before: i64,
    /// Not valid after (Unix timestamp)
    pub not_after: i64,
    /// Extended key usage OIDs
    pub extended_key_usages: Vec<ObjectIdentifier>,
    /// Subject public key
    pub public_key: VerificationKey,
}

impl CertificateInfo {
    /// Whether the certificate lists the given extended key usage
    pub fn has_extended_key_usage(&self, oid: &ObjectIdentifier) -> bool {
        self.extended_key_usages.contains(oid)
    }

    /// Whether `unix_time` falls within `[not_before, not_after]`
    pub fn is_valid_at(&self, unix_time: i64) -> bool {
        self.not_before <= unix_time && unix_time <= self.not_after
    }
}

/// Parse certificate information from a DER-encoded certificate
pub fn parse_certificate_info(cert_der: &[u8]) -> Result<CertificateInfo> {
    let cert = Certificate::from_der(cert_der)
        .map_err(|e| Error::InvalidCertificate(format!("failed to parse certificate: {}", e)))?;

    let validity = &cert.tbs_certificate.validity;
    let not_before = validity.not_before.to_unix_duration().as_secs() as i64;
    let not_after = validity.not_after.to_unix_duration().as_secs() as i64;

    let public_key = VerificationKey::from_spki(&cert.tbs_certificate.subject_public_key_info)?;

    let (common_name, organizations) = extract_subject(&cert);
    let (dns_names, emails, uris) = extract_san(&cert)?;
    let extended_key_usages = extract_extended_key_usages(&cert)?;

    Ok(CertificateInfo {
        common_name,
        organizations,
        dns_names,
        emails,
        uris,
        not_before,
        not_after,
        extended_key_usages,
        public_key,
    })
}

fn extract_subject(cert: &Certificate) -> (Option<String>, Vec<String>) {
    let mut common_name = None;
    let mut organizations = Vec::new();

    for rdn in cert.tbs_certificate.subject.0.iter() {
        for atv in rdn.0.iter() {
            let Some(value) = directory_string(&atv.value) else {
                continue;
            };
            if atv.oid == COMMON_NAME_OID {
                if common_name.is_none() {
                    common_name = Some(value);
                }
            } else if atv.oid == ORGANIZATION_OID {
                organizations.push(value);
            }
        }
    }

    (common_name, organizations)
}

/// Decode the string forms used for subject attributes
fn directory_string(value: &der::Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
            std::str::from_utf8(value.value()).ok().map(str::to_string)
        }
        other => {
            tracing::debug!("Skipping subject attribute with tag {}", other);
            None
        }
    }
}

type SanEntries = (Vec<String>, Vec<String>, Vec<String>);

fn extract_san(cert: &Certificate) -> Result<SanEntries> {
    let san_opt: Option<(bool, SubjectAltName)> = cert
        .tbs_certificate
        .get()
        .map_err(|e| Error::InvalidCertificate(format!("failed to get SAN extension: {}", e)))?;

    let mut dns_names = Vec::new();
    let mut emails = Vec::new();
    let mut uris = Vec::new();

    if let Some((_critical, san)) = san_opt {
        for name in san.0.iter() {
            match name {
                GeneralName::DnsName(dns) => dns_names.push(dns.to_string()),
                GeneralName::Rfc822Name(email) => emails.push(email.to_string()),
                GeneralName::UniformResourceIdentifier(uri) => uris.push(uri.to_string()),
                _ => continue,
            }
        }
    }

    Ok((dns_names, emails, uris))
}

fn extract_extended_key_usages(cert: &Certificate) -> Result<Vec<ObjectIdentifier>> {
    let eku_opt: Option<(bool, ExtendedKeyUsage)> = cert
        .tbs_certificate
        .get()
        .map_err(|e| Error::InvalidCertificate(format!("failed to get EKU extension: {}", e)))?;

    Ok(eku_opt.map(|(_, eku)| eku.0).unwrap_or_default())
}
