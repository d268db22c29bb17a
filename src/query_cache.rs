/// Search result cache.
///
/// Results are kept per `(collection, query, top_k)` for a fixed TTL. When
/// the cache is full the oldest entry is evicted. Destructive operations on
/// a collection must call [`QueryCache::invalidate_collection`].
///
/// Every collection carries a generation that invalidation bumps. Callers
/// read it before searching and pass it to [`QueryCache::insert`], which
/// drops results computed against an older generation.
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::QueryCacheConfig;
use crate::store::ScoredPoint;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    collection: String,
    query: String,
    top_k: usize,
}

struct Entry {
    results: Vec<ScoredPoint>,
    created_at: Instant,
}

#[derive(Default)]
struct State {
    entries: HashMap<Key, Entry>,
    generations: HashMap<String, u64>,
}

impl State {
    fn generation(&self, collection: &str) -> u64 {
        self.generations.get(collection).copied().unwrap_or(0)
    }

    fn expire(&mut self, ttl: Duration) {
        self.entries.retain(|_, e| e.created_at.elapsed() <= ttl);
    }
}

pub struct QueryCache {
    enabled: bool,
    ttl: Duration,
    max_entries: usize,
    state: Mutex<State>,
}

impl QueryCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            enabled: max_entries > 0,
            ttl,
            max_entries,
            state: Mutex::new(State::default()),
        }
    }

    pub fn from_config(cfg: &QueryCacheConfig) -> Self {
        if cfg.enabled {
            Self::new(Duration::from_secs(cfg.ttl_secs), cfg.max_entries)
        } else {
            Self::disabled()
        }
    }

    /// A cache that stores nothing.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(collection: &str, query: &str, top_k: usize) -> Key {
        Key {
            collection: collection.to_string(),
            query: query.to_string(),
            top_k,
        }
    }

    /// Current generation of `collection`.
    pub fn generation(&self, collection: &str) -> u64 {
        self.state().generation(collection)
    }

    pub fn get(&self, collection: &str, query: &str, top_k: usize) -> Option<Vec<ScoredPoint>> {
        if !self.enabled {
            return None;
        }
        let mut state = self.state();
        state.expire(self.ttl);

        let hit = state
            .entries
            .get(&Self::key(collection, query, top_k))
            .map(|e| e.results.clone());
        if hit.is_some() {
            debug!("query cache hit: {collection}");
        }
        hit
    }

    /// Store `results` if `collection` is still at `generation`. Returns
    /// whether they were stored.
    pub fn insert(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
        generation: u64,
        results: Vec<ScoredPoint>,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let mut state = self.state();
        if state.generation(collection) != generation {
            debug!("dropping results for {collection}: invalidated during search");
            return false;
        }
        state.expire(self.ttl);

        let key = Self::key(collection, query, top_k);
        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            if let Some(victim) = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone())
            {
                state.entries.remove(&victim);
            }
        }
        state.entries.insert(
            key,
            Entry {
                results,
                created_at: Instant::now(),
            },
        );
        true
    }

    /// Drop every cached result for `collection` and advance its generation.
    /// Returns how many results were dropped.
    pub fn invalidate_collection(&self, collection: &str) -> usize {
        let mut state = self.state();
        *state.generations.entry(collection.to_string()).or_default() += 1;
        let before = state.entries.len();
        state.entries.retain(|k, _| k.collection != collection);
        before - state.entries.len()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
