use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use super::IndexError;
use crate::embedder::Embedder;
use crate::router::EmbeddingProfile;
use crate::store::{Chunk, CollectionMetadata, DocumentRecord, ScoredPoint, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Resolved,
    /// Evicted from its cache; every operation fails with
    /// [`IndexError::Invalidated`].
    Invalid,
}

/// A resolved collection bound to one embedding profile.
///
/// Handles are shared as `Arc<IndexHandle>`; every caller that resolves the
/// same name through the same cache gets the same instance until it is
/// invalidated.
pub struct IndexHandle {
    name: String,
    profile: EmbeddingProfile,
    metadata: CollectionMetadata,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    invalid: AtomicBool,
}

impl IndexHandle {
    pub(super) fn new(
        name: &str,
        profile: EmbeddingProfile,
        metadata: CollectionMetadata,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            name: name.to_string(),
            profile,
            metadata,
            embedder,
            store,
            invalid: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &EmbeddingProfile {
        &self.profile
    }

    pub fn dimensions(&self) -> usize {
        self.profile.dimensions
    }

    /// Collection metadata as seen when the handle was resolved.
    pub fn metadata(&self) -> &CollectionMetadata {
        &self.metadata
    }

    pub fn state(&self) -> HandleState {
        if self.invalid.load(Ordering::Acquire) {
            HandleState::Invalid
        } else {
            HandleState::Resolved
        }
    }

    pub(super) fn invalidate(&self) {
        self.invalid.store(true, Ordering::Release);
    }

    fn ensure_valid(&self) -> Result<(), IndexError> {
        match self.state() {
            HandleState::Resolved => Ok(()),
            HandleState::Invalid => Err(IndexError::Invalidated(self.name.clone())),
        }
    }

    fn check_len(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.profile.dimensions {
            return Err(IndexError::DimensionMismatch {
                collection: self.name.clone(),
                expected: self.profile.dimensions,
                found: vector.len(),
            });
        }
        Ok(())
    }

    /// Embed `text` with the handle's profile and return the `top_k`
    /// nearest points.
    pub fn search(&self, text: &str, top_k: usize) -> Result<Vec<ScoredPoint>, IndexError> {
        self.ensure_valid()?;
        let vector = self.embedder.embed(text)?;
        self.check_len(&vector)?;
        Ok(self.store.query(&self.name, &vector, top_k)?)
    }

    /// Embed `chunks` and replace the document's points. Returns the number
    /// of points written.
    pub fn upsert(
        &self,
        filename: &str,
        modified_at: DateTime<Utc>,
        chunks: &[Chunk<'_>],
    ) -> Result<usize, IndexError> {
        self.ensure_valid()?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.content).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        for vector in &embeddings {
            self.check_len(vector)?;
        }

        let record = DocumentRecord {
            filename,
            modified_at,
            chunks,
            embeddings: &embeddings,
        };
        Ok(self.store.upsert_document(&self.name, &record)?)
    }

    /// filename -> modified_at of every indexed document.
    pub fn documents(&self) -> Result<HashMap<String, DateTime<Utc>>, IndexError> {
        self.ensure_valid()?;
        Ok(self.store.list_documents(&self.name)?)
    }

    pub fn delete_document(&self, filename: &str) -> Result<bool, IndexError> {
        self.ensure_valid()?;
        Ok(self.store.delete_document(&self.name, filename)?)
    }
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("name", &self.name)
            .field("profile", &self.profile)
            .field("metadata", &self.metadata)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
