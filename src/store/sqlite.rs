//! SQLite + sqlite-vec collection store.
//!
//! Collections, documents and chunks live in ordinary tables; each
//! collection additionally owns a `vec0` virtual table named `vec_<id>`
//! whose column width is the collection's dimensionality.
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, Once};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use tracing::{debug, info};

use super::{
    CollectionMetadata, CollectionStatus, DocumentRecord, Payload, ScoredPoint, StoreError,
    VectorStore, serialize_vector,
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    dimensions INTEGER NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id INTEGER NOT NULL,
    filename TEXT NOT NULL,
    indexed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    modified_at DATETIME NOT NULL,
    UNIQUE(collection_id, filename),
    FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_id);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    content TEXT NOT NULL,
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
"#;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

fn vec_table(collection_id: i64) -> String {
    format!("vec_{collection_id}")
}

/// (id, dimensions) of a collection, if it exists.
fn collection_row(conn: &Connection, name: &str) -> rusqlite::Result<Option<(i64, usize)>> {
    conn.query_row(
        "SELECT id, dimensions FROM collections WHERE name = ?",
        params![name],
        |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)),
    )
    .optional()
}

fn require_collection(conn: &Connection, name: &str) -> Result<(i64, usize), StoreError> {
    collection_row(conn, name)?.ok_or_else(|| StoreError::NoSuchCollection(name.to_string()))
}

/// A [`VectorStore`] over one SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Initializing database: {}", path.display());

        // Register sqlite-vec extension globally
        init_sqlite_vec();

        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
        Self::init(conn)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // Verify sqlite-vec is loaded
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database connection lock poisoned".into()))
    }
}

impl VectorStore for SqliteStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(collection_row(&conn, name)?.is_some())
    }

    fn fetch_metadata(&self, name: &str) -> Result<CollectionMetadata, StoreError> {
        let conn = self.lock()?;
        let (id, dimensions) = require_collection(&conn, name)?;
        let point_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks c JOIN documents d ON c.document_id = d.id WHERE d.collection_id = ?",
            params![id],
            |row| row.get(0),
        )?;
        let point_count = point_count as usize;

        Ok(CollectionMetadata {
            dimensions,
            point_count,
            status: CollectionStatus::for_count(point_count),
        })
    }

    fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let conn = self.lock()?;
        let (id, dimensions) = require_collection(&conn, name)?;
        if vector.len() != dimensions {
            return Err(StoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: dimensions,
                found: vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT
                c.id,
                d.filename,
                c.content,
                c.position,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM {} v
            JOIN chunks c ON v.rowid = c.id
            JOIN documents d ON c.document_id = d.id
            ORDER BY distance ASC
            LIMIT ?
            "#,
            vec_table(id)
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![serialize_vector(vector), top_k as i64],
            |row| {
                let distance: f64 = row.get(4)?;
                Ok(ScoredPoint {
                    id: row.get(0)?,
                    score: 1.0 - distance,
                    payload: Payload {
                        document: row.get(1)?,
                        content: row.get(2)?,
                        position: row.get::<_, i64>(3)? as usize,
                    },
                })
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        debug!("query {name}: {} hits", results.len());
        Ok(results)
    }

    fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        if collection_row(&conn, name)?.is_some() {
            return Err(StoreError::CollectionExists(name.to_string()));
        }

        let tx = conn.transaction()?;
        let id: i64 = tx.query_row(
            "INSERT INTO collections (name, dimensions) VALUES (?, ?) RETURNING id",
            params![name, dimensions as i64],
            |row| row.get(0),
        )?;
        tx.execute_batch(&format!(
            "CREATE VIRTUAL TABLE {} USING vec0(embedding FLOAT[{dimensions}]);",
            vec_table(id)
        ))?;
        tx.commit()?;

        info!("Created collection {name} ({dimensions} dims)");
        Ok(())
    }

    fn delete_collection(&self, name: &str) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let Some((id, _)) = collection_row(&conn, name)? else {
            return Ok(false);
        };

        let tx = conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", vec_table(id)))?;
        // Cascades to documents and chunks
        tx.execute("DELETE FROM collections WHERE id = ?", params![id])?;
        tx.commit()?;

        info!("Deleted collection {name}");
        Ok(true)
    }

    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    fn list_documents(&self, name: &str) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        let conn = self.lock()?;
        let (id, _) = require_collection(&conn, name)?;

        let mut stmt =
            conn.prepare("SELECT filename, modified_at FROM documents WHERE collection_id = ?")?;
        let rows = stmt.query_map(params![id], |row| {
            let filename: String = row.get(0)?;
            let modified_at: DateTime<Utc> = row.get(1)?;
            Ok((filename, modified_at))
        })?;

        let mut docs = HashMap::new();
        for row in rows {
            let (filename, modified_at) = row?;
            docs.insert(filename, modified_at);
        }
        Ok(docs)
    }

    fn upsert_document(&self, name: &str, doc: &DocumentRecord<'_>) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let (collection_id, dimensions) = require_collection(&conn, name)?;
        doc.check_dimensions(name, dimensions)?;
        let table = vec_table(collection_id);

        let tx = conn.transaction()?;

        // Insert or update document and get the stable ID
        let doc_id: i64 = tx.query_row(
            r#"
            INSERT INTO documents (collection_id, filename, modified_at, indexed_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(collection_id, filename) DO UPDATE SET
                modified_at = excluded.modified_at,
                indexed_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![collection_id, doc.filename, doc.modified_at],
            |row| row.get(0),
        )?;

        // Clean up old contents if any (re-indexing)
        tx.execute(
            &format!(
                "DELETE FROM {table} WHERE rowid IN (SELECT id FROM chunks WHERE document_id = ?)"
            ),
            params![doc_id],
        )?;
        tx.execute("DELETE FROM chunks WHERE document_id = ?", params![doc_id])?;

        for (chunk, embedding) in doc.chunks.iter().zip(doc.embeddings) {
            tx.execute(
                "INSERT INTO chunks (document_id, position, content) VALUES (?, ?, ?)",
                params![doc_id, chunk.position as i64, chunk.content],
            )?;
            let chunk_id = tx.last_insert_rowid();

            tx.execute(
                &format!("INSERT INTO {table} (rowid, embedding) VALUES (?, ?)"),
                params![chunk_id, serialize_vector(embedding)],
            )?;
        }

        tx.commit()?;
        Ok(doc.chunks.len())
    }

    fn delete_document(&self, name: &str, filename: &str) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let (collection_id, _) = require_collection(&conn, name)?;

        let tx = conn.transaction()?;
        let doc_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM documents WHERE collection_id = ? AND filename = ?",
                params![collection_id, filename],
                |row| row.get(0),
            )
            .optional()?;

        let Some(doc_id) = doc_id else {
            return Ok(false);
        };

        // Virtual table cascade deletion workaround
        tx.execute(
            &format!(
                "DELETE FROM {} WHERE rowid IN (SELECT id FROM chunks WHERE document_id = ?)",
                vec_table(collection_id)
            ),
            params![doc_id],
        )?;

        // Cascade deletes chunks
        let rows = tx.execute("DELETE FROM documents WHERE id = ?", params![doc_id])?;
        tx.commit()?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Chunk;

    fn unit(dims: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.01f32; dims];
        v[hot] = 1.0;
        v
    }

    fn insert(store: &SqliteStore, collection: &str, filename: &str, texts: &[&str], hot: usize) {
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(position, content)| Chunk { position, content })
            .collect();
        let embeddings: Vec<Vec<f32>> = texts.iter().map(|_| unit(4, hot)).collect();
        store
            .upsert_document(
                collection,
                &DocumentRecord {
                    filename,
                    modified_at: Utc::now(),
                    chunks: &chunks,
                    embeddings: &embeddings,
                },
            )
            .unwrap();
    }

    fn count(store: &SqliteStore, sql: &str) -> i64 {
        store
            .lock()
            .unwrap()
            .query_row(sql, [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_store_init() {
        let store = SqliteStore::open_in_memory().expect("Failed to open in-memory DB");
        let tables = count(
            &store,
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('collections', 'documents', 'chunks')",
        );
        assert_eq!(tables, 3);
        assert!(store.list_collections().unwrap().is_empty());
    }

    #[test]
    fn test_create_and_describe_collection() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(!store.exists("proj1").unwrap());

        store.create_collection("proj1", 4).unwrap();
        assert!(store.exists("proj1").unwrap());

        let meta = store.fetch_metadata("proj1").unwrap();
        assert_eq!(meta.dimensions, 4);
        assert_eq!(meta.point_count, 0);
        assert_eq!(meta.status, CollectionStatus::Empty);

        assert!(matches!(
            store.create_collection("proj1", 4),
            Err(StoreError::CollectionExists(_))
        ));
    }

    #[test]
    fn test_metadata_missing_collection() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.fetch_metadata("missing"),
            Err(StoreError::NoSuchCollection(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_upsert_query_and_reindex() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_collection("proj1", 4).unwrap();

        insert(&store, "proj1", "src/a.rs", &["fn a() {}", "fn b() {}"], 0);
        insert(&store, "proj1", "README.md", &["# Readme"], 2);

        let meta = store.fetch_metadata("proj1").unwrap();
        assert_eq!(meta.point_count, 3);
        assert_eq!(meta.status, CollectionStatus::Ready);

        let hits = store.query("proj1", &unit(4, 2), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.document, "README.md");
        assert!(hits[0].score > 0.99);
        assert!(hits[0].score >= hits[1].score);

        // Re-index replaces the old chunks
        insert(&store, "proj1", "src/a.rs", &["fn a2() {}"], 0);
        assert_eq!(store.fetch_metadata("proj1").unwrap().point_count, 2);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM chunks"), 2);
    }

    #[test]
    fn test_collections_are_isolated() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_collection("a", 4).unwrap();
        store.create_collection("b", 4).unwrap();
        insert(&store, "a", "one.md", &["one"], 1);

        assert_eq!(store.query("b", &unit(4, 1), 5).unwrap().len(), 0);
        assert_eq!(store.query("a", &unit(4, 1), 5).unwrap().len(), 1);
        assert!(store.list_documents("b").unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_collection("wide", 4).unwrap();

        let chunks = [Chunk {
            position: 0,
            content: "x",
        }];
        let embeddings = [vec![1.0f32; 3]];
        let err = store
            .upsert_document(
                "wide",
                &DocumentRecord {
                    filename: "x.md",
                    modified_at: Utc::now(),
                    chunks: &chunks,
                    embeddings: &embeddings,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 4,
                found: 3,
                ..
            }
        ));
        assert!(store.list_documents("wide").unwrap().is_empty());

        assert!(matches!(
            store.query("wide", &[1.0, 0.0], 5),
            Err(StoreError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_delete_document_and_collection() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_collection("proj1", 4).unwrap();
        insert(&store, "proj1", "a.md", &["Hello", "World"], 0);
        insert(&store, "proj1", "b.md", &["Other"], 1);

        assert!(store.delete_document("proj1", "a.md").unwrap());
        assert!(!store.delete_document("proj1", "a.md").unwrap());
        let docs = store.list_documents("proj1").unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs.contains_key("b.md"));
        assert_eq!(count(&store, "SELECT COUNT(*) FROM chunks"), 1);
        assert_eq!(
            count(&store, &format!("SELECT COUNT(*) FROM {}", vec_table(1))),
            1
        );
        assert_eq!(store.fetch_metadata("proj1").unwrap().point_count, 1);

        assert!(store.delete_collection("proj1").unwrap());
        assert!(!store.delete_collection("proj1").unwrap());
        assert!(!store.exists("proj1").unwrap());
        assert_eq!(count(&store, "SELECT COUNT(*) FROM chunks"), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM documents"), 0);

        // Name can be reused with a different width
        store.create_collection("proj1", 8).unwrap();
        assert_eq!(store.fetch_metadata("proj1").unwrap().dimensions, 8);
    }
}
