//! Index handle cache.
//!
//! [`IndexCache`] memoizes one [`IndexHandle`] per collection name. A miss
//! checks the store for the collection, reads its metadata, binds the
//! embedding profile the router picks for the name and caches the result;
//! a hit returns the cached handle without touching the store.
//!
//! Concurrent misses for the same name are collapsed: the first caller
//! resolves while the others wait on a per-name gate and then share its
//! handle. Failed resolutions are never cached.
//!
//! The cache never evicts on its own. Callers that delete or rebuild a
//! collection call [`IndexCache::invalidate`]. A resolution that is in
//! flight when its name is invalidated discards what it loaded and starts
//! over, so at most one live handle exists per name.

mod handle;

pub use handle::{HandleState, IndexHandle};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use crate::embedder::{EmbedderError, EmbedderSet};
use crate::router::CollectionRouter;
use crate::store::{StoreError, VectorStore};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("invalid collection name: {0:?}")]
    InvalidName(String),

    #[error("Project '{collection}' not found. Index it first.")]
    NotFound { collection: String },

    #[error(
        "collection '{collection}' holds {expected}-dimension vectors but its embedding profile produces {found}"
    )]
    DimensionMismatch {
        collection: String,
        expected: usize,
        found: usize,
    },

    #[error("vector store unavailable: {0}")]
    UpstreamUnavailable(#[source] StoreError),

    #[error("vector store rejected the request: {0}")]
    Store(#[source] StoreError),

    #[error("handle for '{0}' was invalidated; resolve it again")]
    Invalidated(String),

    #[error(transparent)]
    Embedding(#[from] EmbedderError),
}

impl From<StoreError> for IndexError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoSuchCollection(collection) => IndexError::NotFound { collection },
            StoreError::DimensionMismatch {
                collection,
                expected,
                found,
            } => IndexError::DimensionMismatch {
                collection,
                expected,
                found,
            },
            err @ (StoreError::Unavailable(_) | StoreError::Sqlite(_)) => {
                IndexError::UpstreamUnavailable(err)
            }
            err @ (StoreError::CollectionExists(_) | StoreError::InvalidRecord(_)) => {
                IndexError::Store(err)
            }
        }
    }
}

enum Slot {
    /// Resolution in flight; waiters queue on the gate.
    Unresolved(Arc<Mutex<()>>),
    Resolved(Arc<IndexHandle>),
}

/// Per-process cache of resolved collection handles.
pub struct IndexCache {
    store: Arc<dyn VectorStore>,
    router: CollectionRouter,
    embedders: EmbedderSet,
    slots: Mutex<HashMap<String, Slot>>,
}

impl IndexCache {
    pub fn new(
        store: Arc<dyn VectorStore>,
        router: CollectionRouter,
        embedders: EmbedderSet,
    ) -> Self {
        Self {
            store,
            router,
            embedders,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn router(&self) -> &CollectionRouter {
        &self.router
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the handle for `name`, resolving it against the store on a miss.
    pub fn resolve(&self, name: &str) -> Result<Arc<IndexHandle>, IndexError> {
        if name.is_empty() {
            return Err(IndexError::InvalidName(name.to_string()));
        }

        loop {
            let gate = {
                let mut slots = self.slots();
                match slots.get(name) {
                    Some(Slot::Resolved(handle)) => {
                        debug!("index cache hit: {name}");
                        return Ok(handle.clone());
                    }
                    Some(Slot::Unresolved(gate)) => gate.clone(),
                    None => {
                        let gate = Arc::new(Mutex::new(()));
                        slots.insert(name.to_string(), Slot::Unresolved(gate.clone()));
                        gate
                    }
                }
            };

            let _turn = gate.lock().unwrap_or_else(PoisonError::into_inner);

            match self.slots().get(name) {
                Some(Slot::Resolved(handle)) => {
                    debug!("index cache hit after wait: {name}");
                    return Ok(handle.clone());
                }
                Some(Slot::Unresolved(current)) if Arc::ptr_eq(current, &gate) => {}
                // Previous attempt failed or was invalidated; start over
                _ => continue,
            }

            debug!("index cache miss: {name}");
            let result = self.load(name);

            let mut slots = self.slots();
            let still_ours =
                matches!(slots.get(name), Some(Slot::Unresolved(g)) if Arc::ptr_eq(g, &gate));
            match result {
                Ok(handle) if still_ours => {
                    let handle = Arc::new(handle);
                    slots.insert(name.to_string(), Slot::Resolved(handle.clone()));
                    return Ok(handle);
                }
                // Invalidated while loading; the collection may be gone or rebuilt
                Ok(_) => {
                    debug!("resolution of {name} was invalidated, retrying");
                    continue;
                }
                Err(e) => {
                    if still_ours {
                        slots.remove(name);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn load(&self, name: &str) -> Result<IndexHandle, IndexError> {
        if !self.store.exists(name)? {
            return Err(IndexError::NotFound {
                collection: name.to_string(),
            });
        }

        let metadata = self.store.fetch_metadata(name)?;
        let profile = self.router.route(name);
        if profile.dimensions != metadata.dimensions {
            return Err(IndexError::DimensionMismatch {
                collection: name.to_string(),
                expected: metadata.dimensions,
                found: profile.dimensions,
            });
        }

        info!(
            "Resolved collection {name}: {} profile, {} dims, {} points",
            profile.kind, metadata.dimensions, metadata.point_count
        );

        Ok(IndexHandle::new(
            name,
            profile.clone(),
            metadata,
            self.embedders.get(profile.kind),
            self.store.clone(),
        ))
    }

    /// Drop the cached handle for `name` and mark it invalid. Returns `true`
    /// if a resolved handle was evicted; an in-flight resolution is
    /// restarted instead.
    pub fn invalidate(&self, name: &str) -> bool {
        match self.slots().remove(name) {
            Some(Slot::Resolved(handle)) => {
                handle.invalidate();
                info!("Invalidated cached handle: {name}");
                true
            }
            Some(Slot::Unresolved(_)) | None => false,
        }
    }

    /// Invalidate every cached handle.
    pub fn clear(&self) {
        let drained: Vec<Slot> = self.slots().drain().map(|(_, slot)| slot).collect();
        for slot in drained {
            if let Slot::Resolved(handle) = slot {
                handle.invalidate();
            }
        }
    }

    /// Names with a resolved handle, sorted.
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Resolved(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Resolved(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
