//! Vector store boundary.
//!
//! [`VectorStore`] is the only way the rest of the crate talks to persisted
//! collections. Two backends ship with the crate:
//!
//! - [`sqlite::SqliteStore`]: SQLite + sqlite-vec, one `vec0` table per collection
//! - [`memory::InMemoryStore`]: brute-force cosine search, for tests and
//!   throwaway sessions
//!
//! A collection's dimensionality is fixed when it is created. Writes whose
//! vectors disagree with it fail with [`StoreError::DimensionMismatch`];
//! vectors are never truncated or padded.

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("collection '{0}' does not exist")]
    NoSuchCollection(String),

    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    #[error("collection '{collection}' stores {expected}-dimension vectors, got {found}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid document record: {0}")]
    InvalidRecord(String),

    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    /// Holds at least one point.
    Ready,
    /// Created but nothing indexed yet.
    Empty,
}

impl CollectionStatus {
    pub fn for_count(point_count: usize) -> Self {
        if point_count == 0 {
            CollectionStatus::Empty
        } else {
            CollectionStatus::Ready
        }
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CollectionStatus::Ready => "ready",
            CollectionStatus::Empty => "empty",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionMetadata {
    pub dimensions: usize,
    pub point_count: usize,
    pub status: CollectionStatus,
}

/// What a point carries besides its vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub document: String,
    pub content: String,
    pub position: usize,
}

/// One query hit. `score` is cosine similarity, higher is closer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPoint {
    pub id: i64,
    pub score: f64,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub position: usize,
    pub content: &'a str,
}

/// A document's full set of chunks with one embedding per chunk.
#[derive(Debug, Clone)]
pub struct DocumentRecord<'a> {
    pub filename: &'a str,
    pub modified_at: DateTime<Utc>,
    pub chunks: &'a [Chunk<'a>],
    pub embeddings: &'a [Vec<f32>],
}

impl DocumentRecord<'_> {
    /// Fails if any embedding does not have exactly `dimensions` components.
    pub(crate) fn check_dimensions(
        &self,
        collection: &str,
        dimensions: usize,
    ) -> Result<(), StoreError> {
        if self.chunks.len() != self.embeddings.len() {
            return Err(StoreError::InvalidRecord(format!(
                "{} chunks but {} embeddings for {}",
                self.chunks.len(),
                self.embeddings.len(),
                self.filename
            )));
        }
        match self.embeddings.iter().find(|v| v.len() != dimensions) {
            Some(bad) => Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                expected: dimensions,
                found: bad.len(),
            }),
            None => Ok(()),
        }
    }
}

/// The external collection store.
///
/// Implementations must be `Send + Sync`; every method is blocking.
pub trait VectorStore: Send + Sync {
    fn exists(&self, name: &str) -> Result<bool, StoreError>;

    fn fetch_metadata(&self, name: &str) -> Result<CollectionMetadata, StoreError>;

    /// Nearest points to `vector`, best first, at most `top_k`.
    fn query(&self, name: &str, vector: &[f32], top_k: usize)
    -> Result<Vec<ScoredPoint>, StoreError>;

    fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError>;

    /// Returns `false` if there was nothing to delete.
    fn delete_collection(&self, name: &str) -> Result<bool, StoreError>;

    fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// filename -> modified_at for every document in the collection.
    fn list_documents(&self, name: &str) -> Result<HashMap<String, DateTime<Utc>>, StoreError>;

    /// Insert or replace a document. Returns the number of points written.
    fn upsert_document(&self, name: &str, doc: &DocumentRecord<'_>) -> Result<usize, StoreError>;

    fn delete_document(&self, name: &str, filename: &str) -> Result<bool, StoreError>;
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty or mismatched inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
