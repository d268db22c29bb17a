/// Embedder trait and shared types for text embedding.
///
/// Every embedding profile gets exactly one embedder; [`EmbedderSet`] holds
/// them keyed by [`ProfileKind`] so handles can borrow the right one.
pub mod mock;
pub mod remote;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::router::{CollectionRouter, EmbeddingProfile, EmbeddingProvider, ProfileKind};

use self::mock::MockEmbedder;
use self::remote::RemoteEmbedder;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding request failed: {0}")]
    RequestFailed(String),

    #[error("embedding service unreachable: {0}")]
    Unavailable(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedder misconfigured: {0}")]
    Misconfigured(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Build the embedder a profile describes.
pub fn for_profile(profile: &EmbeddingProfile) -> Result<Arc<dyn Embedder>, EmbedderError> {
    let embedder: Arc<dyn Embedder> = match profile.provider {
        EmbeddingProvider::Mock => Arc::new(MockEmbedder::new(profile.dimensions)),
        EmbeddingProvider::OpenAi => Arc::new(RemoteEmbedder::openai(profile)?),
        EmbeddingProvider::Ollama => Arc::new(RemoteEmbedder::ollama(profile)?),
    };
    Ok(embedder)
}

/// One embedder per profile kind.
#[derive(Clone)]
pub struct EmbedderSet {
    embedders: HashMap<ProfileKind, Arc<dyn Embedder>>,
}

impl EmbedderSet {
    /// Instantiate an embedder for every profile the router knows about.
    pub fn from_router(router: &CollectionRouter) -> Result<Self, EmbedderError> {
        let mut embedders = HashMap::new();
        for kind in ProfileKind::ALL {
            let profile = router.profile(kind);
            info!(
                "Embedding profile {kind}: {} {} ({} dims)",
                profile.provider, profile.model, profile.dimensions
            );
            embedders.insert(kind, for_profile(profile)?);
        }
        Ok(Self { embedders })
    }

    /// Use the same embedder for every profile kind.
    pub fn uniform(embedder: Arc<dyn Embedder>) -> Self {
        let embedders = ProfileKind::ALL
            .into_iter()
            .map(|kind| (kind, embedder.clone()))
            .collect();
        Self { embedders }
    }

    /// Replace the embedder for a single profile kind.
    #[must_use]
    pub fn with(mut self, kind: ProfileKind, embedder: Arc<dyn Embedder>) -> Self {
        self.embedders.insert(kind, embedder);
        self
    }

    pub fn get(&self, kind: ProfileKind) -> Arc<dyn Embedder> {
        // Both constructors populate every kind.
        self.embedders[&kind].clone()
    }
}
