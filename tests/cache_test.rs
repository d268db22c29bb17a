/// Index handle cache behaviour against a store that counts upstream calls.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use devintel::cache::{HandleState, IndexCache, IndexError};
use devintel::config::{Config, ProfilesConfig};
use devintel::embedder::EmbedderSet;
use devintel::router::{CollectionRouter, ProfileKind};
use devintel::service::ProjectService;
use devintel::store::memory::InMemoryStore;
use devintel::store::{
    Chunk, CollectionMetadata, CollectionStatus, DocumentRecord, ScoredPoint, StoreError,
    VectorStore,
};

/// Parks the first caller until the test releases it.
struct Pause {
    armed: AtomicBool,
    entered: Barrier,
    release: Barrier,
}

impl Pause {
    fn new() -> Self {
        Self {
            armed: AtomicBool::new(true),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        }
    }

    fn hit(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
    }
}

/// Delegates to an in-memory store and counts resolution round-trips.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryStore,
    exists_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
    exists_delay: Option<Duration>,
    exists_pause: Option<Pause>,
    query_pause: Option<Pause>,
}

impl CountingStore {
    fn slow(delay: Duration) -> Self {
        Self {
            exists_delay: Some(delay),
            ..Self::default()
        }
    }

    /// The first `exists` call blocks until released.
    fn pausing_exists() -> Self {
        Self {
            exists_pause: Some(Pause::new()),
            ..Self::default()
        }
    }

    /// The first `query` call computes its hits, then blocks until released.
    fn pausing_query() -> Self {
        Self {
            query_pause: Some(Pause::new()),
            ..Self::default()
        }
    }

    fn exists_pause(&self) -> &Pause {
        self.exists_pause.as_ref().unwrap()
    }

    fn query_pause(&self) -> &Pause {
        self.query_pause.as_ref().unwrap()
    }

    fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

impl VectorStore for CountingStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.exists_delay {
            thread::sleep(delay);
        }
        if let Some(pause) = &self.exists_pause {
            pause.hit();
        }
        self.inner.exists(name)
    }

    fn fetch_metadata(&self, name: &str) -> Result<CollectionMetadata, StoreError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_metadata(name)
    }

    fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let hits = self.inner.query(name, vector, top_k);
        if let Some(pause) = &self.query_pause {
            pause.hit();
        }
        hits
    }

    fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError> {
        self.inner.create_collection(name, dimensions)
    }

    fn delete_collection(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.delete_collection(name)
    }

    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_collections()
    }

    fn list_documents(&self, name: &str) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        self.inner.list_documents(name)
    }

    fn upsert_document(&self, name: &str, doc: &DocumentRecord<'_>) -> Result<usize, StoreError> {
        self.inner.upsert_document(name, doc)
    }

    fn delete_document(&self, name: &str, filename: &str) -> Result<bool, StoreError> {
        self.inner.delete_document(name, filename)
    }
}

/// A store that is always unreachable.
struct DownStore;

impl VectorStore for DownStore {
    fn exists(&self, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn fetch_metadata(&self, _: &str) -> Result<CollectionMetadata, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn query(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<ScoredPoint>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn create_collection(&self, _: &str, _: usize) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn delete_collection(&self, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn list_documents(&self, _: &str) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn upsert_document(&self, _: &str, _: &DocumentRecord<'_>) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn delete_document(&self, _: &str, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

const CODE_DIMS: usize = 32;
const DOC_DIMS: usize = 24;

fn profiles() -> ProfilesConfig {
    let mut profiles = ProfilesConfig::mock(CODE_DIMS);
    profiles.documentation.dimensions = DOC_DIMS;
    profiles
}

fn cache_over(store: Arc<dyn VectorStore>, profiles: ProfilesConfig) -> IndexCache {
    let router = CollectionRouter::new(profiles);
    let embedders = EmbedderSet::from_router(&router).unwrap();
    IndexCache::new(store, router, embedders)
}

#[test]
fn test_idempotent_resolution() {
    let store = Arc::new(CountingStore::default());
    store.create_collection("proj1", CODE_DIMS).unwrap();
    let cache = cache_over(store.clone(), profiles());

    let first = cache.resolve("proj1").unwrap();
    let second = cache.resolve("proj1").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.exists_calls(), 1);
    assert_eq!(store.metadata_calls(), 1);
}

#[test]
fn test_isolation_across_names() {
    let store = Arc::new(CountingStore::default());
    store.create_collection("a", CODE_DIMS).unwrap();
    store.create_collection("b", CODE_DIMS).unwrap();
    let cache = cache_over(store.clone(), profiles());

    let a = cache.resolve("a").unwrap();
    let b = cache.resolve("b").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), "a");
    assert_eq!(b.name(), "b");

    // Invalidating one leaves the other cached
    assert!(cache.invalidate("a"));
    assert_eq!(b.state(), HandleState::Resolved);
    assert!(Arc::ptr_eq(&b, &cache.resolve("b").unwrap()));
    assert_eq!(cache.cached_names(), vec!["b"]);
}

#[test]
fn test_fail_fast_on_absence() {
    let store = Arc::new(CountingStore::default());
    let cache = cache_over(store.clone(), profiles());

    match cache.resolve("missing") {
        Err(IndexError::NotFound { collection }) => assert_eq!(collection, "missing"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(cache.is_empty());

    // The failure is not replayed once the collection exists
    store.create_collection("missing", CODE_DIMS).unwrap();
    assert!(cache.resolve("missing").is_ok());
    assert_eq!(store.exists_calls(), 2);
}

#[test]
fn test_dimension_consistency() {
    let store = Arc::new(CountingStore::default());
    store.create_collection("legacy", 1536).unwrap();
    let chunks = [Chunk {
        position: 0,
        content: "fn main() {}",
    }];
    let embeddings = [vec![0.1f32; 1536]];
    store
        .upsert_document(
            "legacy",
            &DocumentRecord {
                filename: "main.rs",
                modified_at: Utc::now(),
                chunks: &chunks,
                embeddings: &embeddings,
            },
        )
        .unwrap();

    let cache = cache_over(store, ProfilesConfig::mock(384));
    match cache.resolve("legacy") {
        Err(IndexError::DimensionMismatch {
            collection,
            expected,
            found,
        }) => {
            assert_eq!(collection, "legacy");
            assert_eq!(expected, 1536);
            assert_eq!(found, 384);
        }
        other => panic!("expected DimensionMismatch, got {other:?}"),
    }
    assert!(cache.is_empty());
}

#[test]
fn test_doc_collection_scenario() {
    let store = Arc::new(CountingStore::default());
    store.create_collection("docs_llamaindex", DOC_DIMS).unwrap();
    let cache = cache_over(store, profiles());

    assert_eq!(
        cache.router().route("docs_llamaindex").kind,
        ProfileKind::Documentation
    );

    let handle = cache.resolve("docs_llamaindex").unwrap();
    assert_eq!(handle.profile().kind, ProfileKind::Documentation);
    assert_eq!(handle.dimensions(), DOC_DIMS);
    assert_eq!(handle.metadata().status, CollectionStatus::Empty);
    assert!(handle.search("query engine", 3).unwrap().is_empty());
}

#[test]
fn test_requery_after_invalidate() {
    let store = Arc::new(CountingStore::default());
    store.create_collection("proj1", CODE_DIMS).unwrap();
    let cache = cache_over(store.clone(), profiles());

    let first = cache.resolve("proj1").unwrap();
    let second = cache.resolve("proj1").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    assert!(cache.invalidate("proj1"));
    let third = cache.resolve("proj1").unwrap();

    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(first.state(), HandleState::Invalid);
    assert_eq!(store.exists_calls(), 2);
}

#[test]
fn test_concurrent_misses_collapse() {
    const THREADS: usize = 8;

    let store = Arc::new(CountingStore::slow(Duration::from_millis(50)));
    store.create_collection("proj1", CODE_DIMS).unwrap();
    let cache = cache_over(store.clone(), profiles());
    let barrier = Barrier::new(THREADS);

    let handles: Vec<_> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    cache.resolve("proj1").unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(store.exists_calls(), 1);
    assert_eq!(store.metadata_calls(), 1);
    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }
}

#[test]
fn test_concurrent_different_names_resolve_independently() {
    let store = Arc::new(CountingStore::slow(Duration::from_millis(20)));
    for name in ["a", "b", "c", "d"] {
        store.create_collection(name, CODE_DIMS).unwrap();
    }
    let cache = cache_over(store.clone(), profiles());

    thread::scope(|s| {
        for name in ["a", "b", "c", "d"] {
            let cache = &cache;
            s.spawn(move || {
                assert_eq!(cache.resolve(name).unwrap().name(), name);
            });
        }
    });

    assert_eq!(store.exists_calls(), 4);
    assert_eq!(cache.len(), 4);
}

#[test]
fn test_upstream_unavailable_propagates() {
    let cache = cache_over(Arc::new(DownStore), profiles());
    assert!(matches!(
        cache.resolve("proj1"),
        Err(IndexError::UpstreamUnavailable(_))
    ));
    assert!(cache.is_empty());
}

#[test]
fn test_invalidate_during_resolution_leaves_one_handle() {
    let store = Arc::new(CountingStore::pausing_exists());
    store.create_collection("proj1", CODE_DIMS).unwrap();
    let cache = cache_over(store.clone(), profiles());

    thread::scope(|s| {
        let first = s.spawn(|| cache.resolve("proj1").unwrap());

        // The first resolution is parked inside `exists`
        store.exists_pause().entered.wait();
        assert!(!cache.invalidate("proj1"));
        let second = cache.resolve("proj1").unwrap();
        store.exists_pause().release.wait();

        let first = first.join().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), HandleState::Resolved);
    });

    assert_eq!(cache.len(), 1);
}

#[test]
fn test_clear_during_resolution_reports_not_found() {
    let store = Arc::new(CountingStore::pausing_exists());
    store.create_collection("proj1", CODE_DIMS).unwrap();
    let cache = cache_over(store.clone(), profiles());

    thread::scope(|s| {
        let resolving = s.spawn(|| cache.resolve("proj1"));

        store.exists_pause().entered.wait();
        assert!(store.delete_collection("proj1").unwrap());
        cache.invalidate("proj1");
        store.exists_pause().release.wait();

        assert!(matches!(
            resolving.join().unwrap(),
            Err(IndexError::NotFound { .. })
        ));
    });

    assert!(cache.is_empty());
}

#[test]
fn test_search_racing_clear_does_not_cache_results() {
    let store = Arc::new(CountingStore::pausing_query());
    let router = CollectionRouter::new(profiles());
    let embedders = EmbedderSet::from_router(&router).unwrap();
    let config = Config {
        profiles: profiles(),
        ..Config::default()
    };
    let service = ProjectService::new(config, store.clone(), embedders).unwrap();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.md"), "Widget renders dashboards.").unwrap();
    service.index_project(dir.path(), Some("proj1"), false).unwrap();

    thread::scope(|s| {
        let searcher = s.spawn(|| service.search("proj1", "dashboards", None));

        // The search has its hits but has not cached them yet
        store.query_pause().entered.wait();
        assert!(service.clear_project("proj1").unwrap());
        store.query_pause().release.wait();

        let in_flight = searcher.join().unwrap().unwrap();
        assert_eq!(in_flight[0].payload.document, "a.md");
    });

    assert!(service.query_cache().is_empty());
    assert!(matches!(
        service.search("proj1", "dashboards", None),
        Err(IndexError::NotFound { .. })
    ));
}
