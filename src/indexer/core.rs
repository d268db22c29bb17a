use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use globset::GlobSet;
use ignore::WalkBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::IndexHandle;
use crate::indexer::chunker::{self, TextChunk};
use crate::store::Chunk;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

enum Change {
    Added,
    Updated,
}

/// Synchronizes a directory into one collection through its handle.
pub struct Indexer<'a> {
    handle: &'a IndexHandle,
    chunk_size: usize,
    extensions: &'a [String],
    exclude: &'a GlobSet,
}

impl<'a> Indexer<'a> {
    pub fn new(
        handle: &'a IndexHandle,
        chunk_size: usize,
        extensions: &'a [String],
        exclude: &'a GlobSet,
    ) -> Self {
        Self {
            handle,
            chunk_size,
            extensions,
            exclude,
        }
    }

    fn is_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    /// Indexes every supported file under `dir` with differential sync.
    ///
    /// Files whose mtime matches the stored one are skipped unless `force`
    /// is set. Documents whose files no longer exist are removed. Files are
    /// keyed by their path relative to `dir`, with `/` separators.
    pub fn sync_directory<P: AsRef<Path>>(&self, dir: P, force: bool) -> Result<SyncReport> {
        let dir = dir.as_ref();
        anyhow::ensure!(dir.is_dir(), "not a directory: {}", dir.display());

        let existing = self.handle.documents()?;
        let mut seen = HashSet::new();
        let mut report = SyncReport::default();

        // Walk builder respects .gitignore by default
        let walker = WalkBuilder::new(dir).hidden(false).build();

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) || !self.is_supported_extension(path)
            {
                continue;
            }

            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let key = relative.to_string_lossy().replace('\\', "/");
            if self.exclude.is_match(&key) {
                debug!("excluded: {key}");
                continue;
            }
            seen.insert(key.clone());

            let mod_time: DateTime<Utc> = match entry.metadata().map(|m| m.modified()) {
                Ok(Ok(t)) => t.into(),
                Ok(Err(e)) => {
                    warn!("no mtime for {key}: {e}");
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("no metadata for {key}: {e}");
                    report.failed += 1;
                    continue;
                }
            };

            let change = match existing.get(&key) {
                Some(stored) if !force && stored.timestamp() == mod_time.timestamp() => {
                    report.skipped += 1;
                    continue;
                }
                Some(_) => Change::Updated,
                None => Change::Added,
            };

            match self.index_file(path, &key, mod_time) {
                Ok(points) => {
                    debug!("indexed {key}: {points} chunks");
                    report.indexed += 1;
                    match change {
                        Change::Added => report.added += 1,
                        Change::Updated => report.updated += 1,
                    }
                }
                Err(e) => {
                    warn!("failed to index {key}: {e:#}");
                    report.failed += 1;
                }
            }
        }

        for stale in existing.keys().filter(|k| !seen.contains(*k)) {
            if self.handle.delete_document(stale)? {
                debug!("removed {stale}");
                report.removed += 1;
            }
        }

        info!(
            "Synced {}: {} indexed ({} added, {} updated), {} skipped, {} removed, {} failed",
            self.handle.name(),
            report.indexed,
            report.added,
            report.updated,
            report.skipped,
            report.removed,
            report.failed
        );
        Ok(report)
    }

    fn index_file(&self, path: &Path, key: &str, mod_time: DateTime<Utc>) -> Result<usize> {
        let chunks: Vec<TextChunk> = chunker::chunk_file(path, self.chunk_size)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let chunk_refs: Vec<Chunk<'_>> = chunks.iter().map(TextChunk::as_chunk).collect();

        // Empty files are still recorded so they are not re-added next sync
        Ok(self.handle.upsert(key, mod_time, &chunk_refs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::IndexCache;
    use crate::config::{Config, ProfilesConfig};
    use crate::embedder::EmbedderSet;
    use crate::router::CollectionRouter;
    use crate::store::VectorStore;
    use crate::store::memory::InMemoryStore;
    use std::fs;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn handle_for(name: &str) -> Arc<IndexHandle> {
        let store = Arc::new(InMemoryStore::new());
        store.create_collection(name, 16).unwrap();
        let router = CollectionRouter::new(ProfilesConfig::mock(16));
        let embedders = EmbedderSet::from_router(&router).unwrap();
        IndexCache::new(store, router, embedders).resolve(name).unwrap()
    }

    fn touch_later(path: &Path) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(30))
            .unwrap();
    }

    #[test]
    fn test_indexer_differential_sync() {
        let temp_dir = tempdir().unwrap();
        let dir_path = temp_dir.path();
        fs::write(dir_path.join("file1.md"), "Content 1").unwrap();
        fs::write(dir_path.join("file2.py"), "def f():\n    pass\n").unwrap();

        let config = Config::default();
        let exclude = config.exclude_set().unwrap();
        let handle = handle_for("proj1");
        let indexer = Indexer::new(&handle, 500, &config.file_extensions, &exclude);

        // First sync
        let res1 = indexer.sync_directory(dir_path, false).unwrap();
        assert_eq!(res1.added, 2);
        assert_eq!(res1.indexed, 2);
        assert_eq!(res1.skipped, 0);

        // Second sync immediately - should skip both
        let res2 = indexer.sync_directory(dir_path, false).unwrap();
        assert_eq!(res2.indexed, 0);
        assert_eq!(res2.skipped, 2);

        // Force re-indexes everything
        let res3 = indexer.sync_directory(dir_path, true).unwrap();
        assert_eq!(res3.updated, 2);
        assert_eq!(res3.indexed, 2);
        assert_eq!(res3.skipped, 0);

        // Modified file is picked up, deleted file is removed
        touch_later(&dir_path.join("file1.md"));
        fs::remove_file(dir_path.join("file2.py")).unwrap();
        let res4 = indexer.sync_directory(dir_path, false).unwrap();
        assert_eq!(res4.updated, 1);
        assert_eq!(res4.removed, 1);
        assert_eq!(res4.skipped, 0);

        let docs = handle.documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs.contains_key("file1.md"));
    }

    #[test]
    fn test_indexer_filters_extensions_and_excludes() {
        let temp_dir = tempdir().unwrap();
        let dir_path = temp_dir.path();
        fs::create_dir_all(dir_path.join("src")).unwrap();
        fs::create_dir_all(dir_path.join("node_modules/pkg")).unwrap();
        fs::write(dir_path.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir_path.join("image.png"), [0u8, 1, 2]).unwrap();
        fs::write(dir_path.join("node_modules/pkg/index.js"), "module.exports = 1;").unwrap();

        let config = Config::default();
        let exclude = config.exclude_set().unwrap();
        let handle = handle_for("proj1");
        let indexer = Indexer::new(&handle, 500, &config.file_extensions, &exclude);

        let report = indexer.sync_directory(dir_path, false).unwrap();
        assert_eq!(report.indexed, 1);

        let docs = handle.documents().unwrap();
        assert_eq!(docs.keys().collect::<Vec<_>>(), vec!["src/main.rs"]);
    }

    #[test]
    fn test_empty_file_is_recorded() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("empty.md"), "").unwrap();

        let config = Config::default();
        let exclude = config.exclude_set().unwrap();
        let handle = handle_for("proj1");
        let indexer = Indexer::new(&handle, 500, &config.file_extensions, &exclude);

        assert_eq!(indexer.sync_directory(temp_dir.path(), false).unwrap().added, 1);
        assert_eq!(indexer.sync_directory(temp_dir.path(), false).unwrap().skipped, 1);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let config = Config::default();
        let exclude = config.exclude_set().unwrap();
        let handle = handle_for("proj1");
        let indexer = Indexer::new(&handle, 500, &config.file_extensions, &exclude);
        assert!(indexer.sync_directory("/definitely/not/here", false).is_err());
    }
}
