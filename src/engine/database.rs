//! SQLite persistence backend
//! Pooled rusqlite connections implementing the document store's storage seam

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use thiserror::Error;

use crate::engine::docstore::error::{Result as StoreResult, StoreError};
use crate::engine::docstore::storage::{CollectionStorage, StoredEntry, VersionRecord, VersionStore};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const SCHEMA_VERSION_KEY: &str = "schema_version";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool: {0}")]
    PoolError(#[from] r2d2::Error),
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt metadata: {0}")]
    Corrupt(String),
}

#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub fn new(db_path: &Path, pool_size: u32) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        // Every in-memory connection is its own database, so keep exactly one.
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;
        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.pool.get()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _docstore_documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                payload BLOB NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE TABLE IF NOT EXISTS _docstore_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS _docstore_versions (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        // PRAGMA journal_mode reports the resulting mode as a row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Ok(())
    }

    pub fn get_connection(&self) -> Result<DbConnection, DatabaseError> {
        Ok(self.pool.get()?)
    }

    fn upsert(&self, collection: &str, id: &str, payload: &[u8]) -> Result<(), DatabaseError> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO _docstore_documents (collection, id, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![collection, id, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, collection: &str, id: &str) -> Result<(), DatabaseError> {
        let conn = self.get_connection()?;
        conn.execute(
            "DELETE FROM _docstore_documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(())
    }

    fn fetch(&self, collection: &str, id: &str) -> Result<Option<Vec<u8>>, DatabaseError> {
        let conn = self.get_connection()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM _docstore_documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn page(&self, collection: &str, after: Option<&str>, limit: usize) -> Result<Vec<StoredEntry>, DatabaseError> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, payload FROM _docstore_documents
             WHERE collection = ?1 AND id > ?2
             ORDER BY id
             LIMIT ?3",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map(params![collection, after.unwrap_or(""), limit], |row| {
                Ok(StoredEntry {
                    id: row.get(0)?,
                    payload: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<StoredEntry>, _>>()?;
        Ok(entries)
    }

    fn count_documents(&self, collection: &str) -> Result<usize, DatabaseError> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM _docstore_documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn get_collections(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT collection FROM _docstore_documents ORDER BY collection",
        )?;
        let collections = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(collections)
    }

    fn clear_collection(&self, collection: &str) -> Result<(), DatabaseError> {
        let conn = self.get_connection()?;
        conn.execute(
            "DELETE FROM _docstore_documents WHERE collection = ?1",
            params![collection],
        )?;
        Ok(())
    }

    fn read_version(&self) -> Result<Option<u32>, DatabaseError> {
        let conn = self.get_connection()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM _docstore_meta WHERE key = ?1",
                params![SCHEMA_VERSION_KEY],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|value| {
            value
                .parse::<u32>()
                .map_err(|_| DatabaseError::Corrupt(format!("schema version {value:?}")))
        })
        .transpose()
    }

    fn record_version(&self, version: u32, applied_at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO _docstore_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SCHEMA_VERSION_KEY, version.to_string()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO _docstore_versions (version, applied_at) VALUES (?1, ?2)",
            params![version, applied_at.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_version_journal(&self) -> Result<Vec<VersionRecord>, DatabaseError> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare("SELECT version, applied_at FROM _docstore_versions ORDER BY version")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(version, applied_at)| {
                let applied_at = DateTime::parse_from_rfc3339(&applied_at)
                    .map_err(|e| DatabaseError::Corrupt(format!("applied_at for version {version}: {e}")))?
                    .with_timezone(&Utc);
                Ok(VersionRecord { version, applied_at })
            })
            .collect()
    }
}

fn write_failure(collection: &str, id: &str, err: DatabaseError) -> StoreError {
    StoreError::WriteFailure {
        collection: collection.to_string(),
        id: id.to_string(),
        detail: err.to_string(),
    }
}

fn read_failure(collection: &str, id: &str, err: DatabaseError) -> StoreError {
    StoreError::ReadFailure {
        collection: collection.to_string(),
        id: id.to_string(),
        detail: err.to_string(),
    }
}

fn collection_failure(collection: &str, err: DatabaseError) -> StoreError {
    StoreError::CollectionFailure {
        collection: collection.to_string(),
        detail: err.to_string(),
    }
}

impl CollectionStorage for Database {
    fn put(&self, collection: &str, id: &str, payload: &[u8]) -> StoreResult<()> {
        self.upsert(collection, id, payload)
            .map_err(|e| write_failure(collection, id, e))
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.fetch(collection, id)
            .map_err(|e| read_failure(collection, id, e))
    }

    fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.remove(collection, id)
            .map_err(|e| write_failure(collection, id, e))
    }

    fn scan_page(&self, collection: &str, after: Option<&str>, limit: usize) -> StoreResult<Vec<StoredEntry>> {
        self.page(collection, after, limit)
            .map_err(|e| collection_failure(collection, e))
    }

    fn count(&self, collection: &str) -> StoreResult<usize> {
        self.count_documents(collection)
            .map_err(|e| collection_failure(collection, e))
    }

    fn list_collections(&self) -> StoreResult<Vec<String>> {
        Ok(self.get_collections()?)
    }

    fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.clear_collection(collection)
            .map_err(|e| collection_failure(collection, e))
    }
}

impl VersionStore for Database {
    fn load_version(&self) -> StoreResult<Option<u32>> {
        Ok(self.read_version()?)
    }

    fn commit_version(&self, version: u32, applied_at: DateTime<Utc>) -> StoreResult<()> {
        Ok(self.record_version(version, applied_at)?)
    }

    fn version_journal(&self) -> StoreResult<Vec<VersionRecord>> {
        Ok(self.get_version_journal()?)
    }
}
