//! File-based entry points
//!
//! These read a trusted root, an optional verifier configuration and the
//! envelopes from disk, then hand them to [`Verifier`].

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use veritas_trust_root::TrustedRoot;
use veritas_types::DigestSet;
use veritas_verify::{CancellationToken, VerificationRequest, Verdict, Verifier, VerifierConfig};

/// Inputs of a verification, by path
#[derive(Debug, Clone)]
pub struct VerifyPaths {
    /// Signed policy envelope
    pub policy: PathBuf,
    /// Attestation envelopes
    pub envelopes: Vec<PathBuf>,
    /// Artifact that must be an accepted product
    pub artifact: Option<DigestSet>,
}

impl VerifyPaths {
    pub fn new(policy: impl Into<PathBuf>) -> Self {
        Self {
            policy: policy.into(),
            envelopes: Vec::new(),
            artifact: None,
        }
    }

    pub fn with_envelope(mut self, path: impl Into<PathBuf>) -> Self {
        self.envelopes.push(path.into());
        self
    }

    pub fn with_artifact(mut self, artifact: DigestSet) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Read every input into a request
    pub fn load(&self) -> Result<VerificationRequest> {
        let mut request = VerificationRequest::new(read(&self.policy)?);
        for path in &self.envelopes {
            request = request.with_envelope(read(path)?);
        }
        if let Some(artifact) = &self.artifact {
            request = request.with_artifact(artifact.clone());
        }
        Ok(request)
    }
}

/// Build a verifier from a trusted root file and an optional config file
pub fn load_verifier(trusted_root: &Path, config: Option<&Path>) -> Result<Verifier> {
    let pinned = TrustedRoot::from_file(trusted_root)?.to_trust_store()?;
    let config = match config {
        Some(path) => VerifierConfig::from_file(path)?,
        None => VerifierConfig::default(),
    };
    tracing::debug!(
        "Loaded {} pinned key(s) from {}",
        pinned.keyring().len(),
        trusted_root.display()
    );
    Ok(Verifier::new(pinned, config))
}

/// Load the inputs named by `paths` and verify them
pub async fn verify_files(
    verifier: &Verifier,
    paths: &VerifyPaths,
    cancel: &CancellationToken,
) -> Result<Verdict> {
    let request = paths.load()?;
    Ok(verifier.verify(&request, cancel).await)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}
