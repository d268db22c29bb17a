/// Deterministic embedder for tests and offline runs.
///
/// Vectors are derived from a hash of the input text, so the same text
/// always maps to the same unit vector and no network access is needed.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

/// A mock embedder that produces deterministic vectors from text hashes.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut embedding = Vec::with_capacity(self.dimensions);

        // Every 8 components come from one hash of (text, block index)
        let mut block = [0u8; 8];
        for i in 0..self.dimensions {
            if i % 8 == 0 {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                (i / 8).hash(&mut hasher);
                block = hasher.finish().to_le_bytes();
            }
            embedding.push(f32::from(block[i % 8]) / 255.0 - 0.5);
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
