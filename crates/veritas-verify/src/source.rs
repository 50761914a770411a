//! Envelope storage collaborator
//!
//! The engine never assumes a query protocol: a source only maps a subject
//! digest to the envelopes that mention it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;
use veritas_types::{DigestSet, Envelope, Statement};

/// Errors reported by an envelope source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The backing store failed
    #[error("envelope source error: {0}")]
    Backend(String),

    /// An envelope offered for indexing could not be read
    #[error("cannot index envelope: {0}")]
    InvalidEnvelope(String),
}

/// Looks up envelopes by subject digest
pub trait EnvelopeSource: Send + Sync {
    /// Raw envelopes whose statement subjects match `digest`
    fn envelopes_for(
        &self,
        digest: &DigestSet,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<u8>>, SourceError>> + Send + '_>>;
}

impl<T: EnvelopeSource + ?Sized> EnvelopeSource for Arc<T> {
    fn envelopes_for(
        &self,
        digest: &DigestSet,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<u8>>, SourceError>> + Send + '_>> {
        (**self).envelopes_for(digest)
    }
}

#[derive(Debug, Default)]
struct Index {
    envelopes: Vec<Vec<u8>>,
    subjects: Vec<(DigestSet, usize)>,
}

/// In-process source indexed by statement subjects
///
/// Thread-safe and suitable for use across async tasks.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEnvelopeSource {
    index: Arc<RwLock<Index>>,
}

impl InMemoryEnvelopeSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an envelope, indexing it by the subjects of its statement.
    ///
    /// Returns the number of subjects indexed.
    pub async fn insert(&self, envelope_bytes: Vec<u8>) -> Result<usize, SourceError> {
        let envelope = Envelope::decode(&envelope_bytes)
            .map_err(|e| SourceError::InvalidEnvelope(e.to_string()))?;
        let payload = envelope
            .payload_bytes()
            .map_err(|e| SourceError::InvalidEnvelope(e.to_string()))?;
        let statement: Statement = serde_json::from_slice(&payload)
            .map_err(|e| SourceError::InvalidEnvelope(format!("payload is not a statement: {}", e)))?;

        let mut index = self.index.write().await;
        if index.envelopes.contains(&envelope_bytes) {
            return Ok(0);
        }
        let position = index.envelopes.len();
        index.envelopes.push(envelope_bytes);
        let count = statement.subject.len();
        for subject in statement.subject {
            index.subjects.push((subject.digest, position));
        }
        Ok(count)
    }

    /// Number of stored envelopes
    pub async fn len(&self) -> usize {
        self.index.read().await.envelopes.len()
    }

    /// Whether no envelopes are stored
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.envelopes.is_empty()
    }
}

impl EnvelopeSource for InMemoryEnvelopeSource {
    fn envelopes_for(
        &self,
        digest: &DigestSet,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<u8>>, SourceError>> + Send + '_>> {
        let digest = digest.clone();
        Box::pin(async move {
            let index = self.index.read().await;
            let mut positions: Vec<usize> = index
                .subjects
                .iter()
                .filter(|(d, _)| d.matches(&digest))
                .map(|(_, p)| *p)
                .collect();
            positions.sort_unstable();
            positions.dedup();
            Ok(positions
                .into_iter()
                .map(|p| index.envelopes[p].clone())
                .collect())
        })
    }
}
