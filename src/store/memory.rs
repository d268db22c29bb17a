//! In-memory [`VectorStore`] for tests and `--ephemeral` sessions.
//!
//! Collections live in a `HashMap` behind a `RwLock`. Queries are
//! brute-force cosine similarity over every point in the collection.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::{
    CollectionMetadata, CollectionStatus, DocumentRecord, Payload, ScoredPoint, StoreError,
    VectorStore, cosine_similarity,
};

struct StoredPoint {
    id: i64,
    document: String,
    position: usize,
    content: String,
    vector: Vec<f32>,
}

struct MemCollection {
    dimensions: usize,
    documents: HashMap<String, DateTime<Utc>>,
    points: Vec<StoredPoint>,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, MemCollection>,
    next_id: i64,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

fn missing(name: &str) -> StoreError {
    StoreError::NoSuchCollection(name.to_string())
}

impl VectorStore for InMemoryStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.collections.contains_key(name))
    }

    fn fetch_metadata(&self, name: &str) -> Result<CollectionMetadata, StoreError> {
        let state = self.read()?;
        let coll = state.collections.get(name).ok_or_else(|| missing(name))?;
        Ok(CollectionMetadata {
            dimensions: coll.dimensions,
            point_count: coll.points.len(),
            status: CollectionStatus::for_count(coll.points.len()),
        })
    }

    fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let state = self.read()?;
        let coll = state.collections.get(name).ok_or_else(|| missing(name))?;
        if vector.len() != coll.dimensions {
            return Err(StoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: coll.dimensions,
                found: vector.len(),
            });
        }

        let mut scored: Vec<(f32, &StoredPoint)> = coll
            .points
            .iter()
            .map(|p| (cosine_similarity(vector, &p.vector), p))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, p)| ScoredPoint {
                id: p.id,
                score: f64::from(score),
                payload: Payload {
                    document: p.document.clone(),
                    content: p.content.clone(),
                    position: p.position,
                },
            })
            .collect())
    }

    fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }
        state.collections.insert(
            name.to_string(),
            MemCollection {
                dimensions,
                documents: HashMap::new(),
                points: Vec::new(),
            },
        );
        Ok(())
    }

    fn delete_collection(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.write()?.collections.remove(name).is_some())
    }

    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.read()?.collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn list_documents(&self, name: &str) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        let state = self.read()?;
        let coll = state.collections.get(name).ok_or_else(|| missing(name))?;
        Ok(coll.documents.clone())
    }

    fn upsert_document(&self, name: &str, doc: &DocumentRecord<'_>) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        let mut next_id = state.next_id;
        let coll = state.collections.get_mut(name).ok_or_else(|| missing(name))?;
        doc.check_dimensions(name, coll.dimensions)?;

        coll.points.retain(|p| p.document != doc.filename);
        for (chunk, embedding) in doc.chunks.iter().zip(doc.embeddings) {
            next_id += 1;
            coll.points.push(StoredPoint {
                id: next_id,
                document: doc.filename.to_string(),
                position: chunk.position,
                content: chunk.content.to_string(),
                vector: embedding.clone(),
            });
        }
        coll.documents
            .insert(doc.filename.to_string(), doc.modified_at);

        state.next_id = next_id;
        Ok(doc.chunks.len())
    }

    fn delete_document(&self, name: &str, filename: &str) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let coll = state.collections.get_mut(name).ok_or_else(|| missing(name))?;
        if coll.documents.remove(filename).is_none() {
            return Ok(false);
        }
        coll.points.retain(|p| p.document != filename);
        Ok(true)
    }
}
