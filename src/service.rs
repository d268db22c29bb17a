//! Project operations shared by the CLI and the MCP server.
//!
//! [`ProjectService`] owns the index handle cache and the query cache. It is
//! also the only place that deletes or rebuilds collections, so it is where
//! both caches are invalidated.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use globset::GlobSet;
use serde::Serialize;
use tracing::info;

use crate::cache::{IndexCache, IndexError, IndexHandle};
use crate::config::Config;
use crate::embedder::EmbedderSet;
use crate::indexer::{ConversationLog, ConversationReport, Indexer, SyncReport};
use crate::query_cache::QueryCache;
use crate::router::{self, CollectionRouter, EmbeddingProfile, ProfileKind};
use crate::store::memory::InMemoryStore;
use crate::store::sqlite::SqliteStore;
use crate::store::{CollectionStatus, ScoredPoint, StoreError, VectorStore};

/// Result of indexing one directory into one collection.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub project: String,
    pub kind: ProfileKind,
    #[serde(flatten)]
    pub report: SyncReport,
}

/// Default collection for imported conversation logs.
pub const CONVERSATIONS_COLLECTION: &str = "conversations";

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub project: String,
    pub kind: ProfileKind,
    #[serde(flatten)]
    pub report: ConversationReport,
}

/// One library's answer in [`ProjectService::compare_libraries`].
#[derive(Debug, Clone, Serialize)]
pub struct LibraryAnswer {
    pub library: String,
    pub indexed: bool,
    pub results: Vec<ScoredPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    pub name: String,
    pub indexed: bool,
    pub kind: ProfileKind,
    pub model: String,
    /// Dimensionality of the stored collection, if it exists.
    pub dimensions: Option<usize>,
    pub point_count: usize,
    pub documents: usize,
    pub status: Option<CollectionStatus>,
    pub cached: bool,
}

pub struct ProjectService {
    config: Config,
    cache: IndexCache,
    queries: QueryCache,
    exclude: GlobSet,
}

/// Collection name derived from a directory: its final path component.
pub fn project_name(path: &Path) -> Result<String> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("cannot resolve path: {}", path.display()))?;
    canonical
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("cannot derive a project name from {}", path.display()))
}

impl ProjectService {
    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedders: EmbedderSet,
    ) -> Result<Self> {
        config.validate()?;
        let exclude = config.exclude_set()?;
        let router = CollectionRouter::new(config.profiles.clone());
        let queries = QueryCache::from_config(&config.query_cache);

        Ok(Self {
            cache: IndexCache::new(store, router, embedders),
            queries,
            exclude,
            config,
        })
    }

    /// Open the configured store (or an in-memory one) and build an
    /// embedder for every profile.
    pub fn open(config: Config, ephemeral: bool) -> Result<Self> {
        let store: Arc<dyn VectorStore> = if ephemeral {
            info!("Using in-memory vector store");
            Arc::new(InMemoryStore::new())
        } else {
            Arc::new(
                SqliteStore::open(&config.db_path)
                    .with_context(|| format!("failed to open {}", config.db_path))?,
            )
        };

        let router = CollectionRouter::new(config.profiles.clone());
        let embedders = EmbedderSet::from_router(&router).context("failed to set up embedders")?;
        Self::new(config, store, embedders)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.queries
    }

    fn store(&self) -> &Arc<dyn VectorStore> {
        self.cache.store()
    }

    pub fn route(&self, name: &str) -> &EmbeddingProfile {
        self.cache.router().route(name)
    }

    /// Resolve `name`, first creating the collection with the routed
    /// profile's dimensionality if it does not exist.
    fn open_collection(&self, name: &str) -> Result<Arc<IndexHandle>> {
        anyhow::ensure!(!name.is_empty(), IndexError::InvalidName(name.to_string()));
        if !self.store().exists(name)? {
            match self.store().create_collection(name, self.route(name).dimensions) {
                Ok(()) | Err(StoreError::CollectionExists(_)) => {}
                Err(e) => return Err(e).context(format!("failed to create collection {name}")),
            }
        }
        Ok(self.cache.resolve(name)?)
    }

    /// Index `path` into `name` (default: the directory name), creating the
    /// collection if needed.
    pub fn index_project(
        &self,
        path: &Path,
        name: Option<&str>,
        force: bool,
    ) -> Result<IndexSummary> {
        let name = match name {
            Some(n) => n.to_string(),
            None => project_name(path)?,
        };
        let profile = self.route(&name);

        let handle = self.open_collection(&name)?;
        let indexer = Indexer::new(
            &handle,
            self.config.chunk_size,
            &self.config.file_extensions,
            &self.exclude,
        );
        let report = indexer.sync_directory(path, force)?;

        if report.indexed > 0 || report.removed > 0 {
            self.queries.invalidate_collection(&name);
        }

        Ok(IndexSummary {
            project: name,
            kind: profile.kind,
            report,
        })
    }

    /// Re-index only files changed since the last sync.
    pub fn refresh_project(&self, path: &Path, name: Option<&str>) -> Result<IndexSummary> {
        self.index_project(path, name, false)
    }

    /// Drop the collection and index `path` from scratch.
    pub fn reindex_project(&self, path: &Path, name: Option<&str>) -> Result<IndexSummary> {
        let name = match name {
            Some(n) => n.to_string(),
            None => project_name(path)?,
        };
        self.clear_project(&name)?;
        self.index_project(path, Some(&name), true)
    }

    /// Index a library's documentation into its `docs_` collection.
    pub fn index_docs(&self, library: &str, path: &Path, force: bool) -> Result<IndexSummary> {
        self.index_project(path, Some(&router::docs_collection(library)), force)
    }

    /// Import a JSONL conversation log into `name` (default:
    /// [`CONVERSATIONS_COLLECTION`]). The log is parsed before the
    /// collection is created, so a log without messages leaves no trace.
    pub fn index_conversations(
        &self,
        path: &Path,
        name: Option<&str>,
        force: bool,
    ) -> Result<ConversationSummary> {
        let name = name.unwrap_or(CONVERSATIONS_COLLECTION);
        let log = ConversationLog::read(path)?;

        let handle = self.open_collection(name)?;
        let report = log.index_into(&handle, force)?;
        if !report.skipped {
            self.queries.invalidate_collection(name);
        }

        Ok(ConversationSummary {
            project: name.to_string(),
            kind: handle.profile().kind,
            report,
        })
    }

    /// Semantic search over one collection. `top_k` defaults to the
    /// configured `search_top_k`.
    pub fn search(
        &self,
        name: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredPoint>, IndexError> {
        let top_k = top_k.unwrap_or(self.config.search_top_k);
        let generation = self.queries.generation(name);
        if let Some(hit) = self.queries.get(name, query, top_k) {
            return Ok(hit);
        }

        let handle = self.cache.resolve(name)?;
        let results = handle.search(query, top_k)?;
        self.queries.insert(name, query, top_k, generation, results.clone());
        Ok(results)
    }

    /// Search a library's documentation. `examples_only` steers the query
    /// towards code samples.
    pub fn search_docs(
        &self,
        library: &str,
        query: &str,
        top_k: Option<usize>,
        examples_only: bool,
    ) -> Result<Vec<ScoredPoint>, IndexError> {
        let collection = router::docs_collection(library);
        if examples_only {
            self.search(&collection, &format!("{query} code example implementation"), top_k)
        } else {
            self.search(&collection, query, top_k)
        }
    }

    /// Implementation examples for `task` from a library's documentation.
    pub fn how_to(
        &self,
        task: &str,
        library: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredPoint>, IndexError> {
        let query = format!("How to {task} with code example step by step implementation");
        self.search_docs(library, &query, top_k, true)
    }

    /// [`Self::how_to`] across several libraries. Libraries without indexed
    /// documentation are reported with `indexed: false`.
    pub fn compare_libraries(
        &self,
        task: &str,
        libraries: &[String],
        top_k: Option<usize>,
    ) -> Result<Vec<LibraryAnswer>, IndexError> {
        libraries
            .iter()
            .map(|library| {
                let (indexed, results) = match self.how_to(task, library, top_k) {
                    Ok(results) => (true, results),
                    Err(IndexError::NotFound { .. }) => (false, Vec::new()),
                    Err(e) => return Err(e),
                };
                Ok(LibraryAnswer {
                    library: library.clone(),
                    indexed,
                    results,
                })
            })
            .collect()
    }

    /// Every collection that is not a documentation collection.
    pub fn list_projects(&self) -> Result<Vec<String>> {
        Ok(self
            .store()
            .list_collections()?
            .into_iter()
            .filter(|name| router::framework_name(name).is_none())
            .collect())
    }

    /// Libraries with an indexed documentation collection.
    pub fn list_frameworks(&self) -> Result<Vec<String>> {
        Ok(self
            .store()
            .list_collections()?
            .iter()
            .filter_map(|name| router::framework_name(name))
            .map(str::to_string)
            .collect())
    }

    pub fn project_info(&self, name: &str) -> Result<ProjectInfo> {
        let profile = self.route(name);
        let mut info = ProjectInfo {
            name: name.to_string(),
            indexed: false,
            kind: profile.kind,
            model: profile.model.clone(),
            dimensions: None,
            point_count: 0,
            documents: 0,
            status: None,
            cached: self.cache.cached_names().iter().any(|n| n == name),
        };

        if self.store().exists(name)? {
            let metadata = self.store().fetch_metadata(name)?;
            info.indexed = true;
            info.dimensions = Some(metadata.dimensions);
            info.point_count = metadata.point_count;
            info.status = Some(metadata.status);
            info.documents = self.store().list_documents(name)?.len();
        }
        Ok(info)
    }

    /// Delete a collection and drop every cached handle and result for it.
    /// Returns `false` if the collection did not exist.
    pub fn clear_project(&self, name: &str) -> Result<bool> {
        let deleted = self.store().delete_collection(name)?;
        self.cache.invalidate(name);
        let dropped = self.queries.invalidate_collection(name);
        info!("Cleared project {name} (existed: {deleted}, cached results dropped: {dropped})");
        Ok(deleted)
    }
}
