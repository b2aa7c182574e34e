//! Document store facade
//!
//! Typed CRUD and queries over named collections. Every operation takes the
//! codec for the record type it reads or writes, so the expected shape is
//! fixed at the call site.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::config::{BackendConfig, StoreConfig};
use crate::engine::database::Database;

use super::codec::{Codec, CodecError, JsonCodec};
use super::collection::{validate_collection_name, validate_document_id, Collection};
use super::error::{Result, StoreError};
use super::migration::MigrationState;
use super::query::{Query, QueryRow};
use super::registry::SchemaVersionRegistry;
use super::storage::{Backend, BulkWriteReport, EntryOutcome, MemoryStorage, Scan, VersionRecord};

pub struct DocumentStore {
    pub(super) backend: Arc<dyn Backend>,
    scan_batch_size: usize,
    pub(super) migration: Mutex<MigrationState>,
}

impl DocumentStore {
    /// Open a store on the backend named in `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let backend: Arc<dyn Backend> = match &config.backend {
            BackendConfig::Memory => Arc::new(MemoryStorage::new()),
            BackendConfig::Sqlite { path } => Arc::new(Database::new(path, config.pool_size)?),
        };
        info!(target: "docstore::store", backend = ?config.backend, "Opened document store");

        Ok(Self::with_backend(backend).with_scan_batch_size(config.scan_batch_size))
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryStorage::new()))
    }

    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            scan_batch_size: 256,
            migration: Mutex::new(MigrationState::Idle),
        }
    }

    pub fn with_scan_batch_size(mut self, batch_size: usize) -> Self {
        self.scan_batch_size = batch_size.max(1);
        self
    }

    /// Bind a collection name and JSON codec for record type `T`.
    pub fn collection<T>(&self, name: &str) -> Collection<'_, T> {
        Collection::new(self, name, JsonCodec::new())
    }

    /// Bind a collection name and an explicit codec.
    pub fn collection_with<T, C: Codec<T>>(&self, name: &str, codec: C) -> Collection<'_, T, C> {
        Collection::new(self, name, codec)
    }

    // ========== Writes ==========

    /// Store `record` under `id`, replacing any previous document.
    pub fn save<T, C>(&self, collection: &str, codec: &C, id: &str, record: &T) -> Result<()>
    where
        C: Codec<T> + ?Sized,
    {
        validate_collection_name(collection)?;
        validate_document_id(id)?;
        let payload = encode_record(codec, collection, id, record)?;
        self.backend.put(collection, id, &payload)
    }

    /// Save many records. Each entry succeeds or fails on its own; the report
    /// lists outcomes in input order.
    pub fn save_all<T, C, K, I>(&self, collection: &str, codec: &C, records: I) -> Result<BulkWriteReport>
    where
        C: Codec<T> + ?Sized,
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        validate_collection_name(collection)?;

        let mut batch = Vec::new();
        let mut rejected = Vec::new();
        for (index, (id, record)) in records.into_iter().enumerate() {
            let id = id.into();
            let encoded = validate_document_id(&id)
                .and_then(|_| encode_record(codec, collection, &id, &record));
            match encoded {
                Ok(payload) => batch.push((id, payload)),
                Err(e) => rejected.push((index, id, e)),
            }
        }

        let mut report = self.backend.put_all(collection, &batch);
        // Ascending indices, so each insert lands at its original position
        for (index, id, err) in rejected {
            report.outcomes.insert(index, EntryOutcome { id, result: Err(err) });
        }

        if !report.is_complete() {
            warn!(
                target: "docstore::store",
                collection,
                failed = report.failed().len(),
                written = report.written().len(),
                "Bulk save incomplete"
            );
        }
        Ok(report)
    }

    /// Save under a freshly generated id and return it.
    pub fn insert<T, C>(&self, collection: &str, codec: &C, record: &T) -> Result<String>
    where
        C: Codec<T> + ?Sized,
    {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.save(collection, codec, &id, record)?;
        Ok(id)
    }

    /// Read, transform and write back one document.
    ///
    /// Not atomic: a concurrent writer between the read and the write loses
    /// its update.
    pub fn update<T, C, F>(&self, collection: &str, codec: &C, id: &str, transform: F) -> Result<T>
    where
        C: Codec<T> + ?Sized,
        F: FnOnce(T) -> T,
    {
        let current = self.get(collection, codec, id)?;
        let next = transform(current);
        self.save(collection, codec, id, &next)?;
        Ok(next)
    }

    /// Remove a document. Deleting an absent id succeeds.
    pub fn delete(&self, collection: &str, id: &str) -> Result<()> {
        validate_collection_name(collection)?;
        validate_document_id(id)?;
        self.backend.delete(collection, id)
    }

    /// Remove every document in a collection.
    pub fn drop_collection(&self, collection: &str) -> Result<()> {
        validate_collection_name(collection)?;
        info!(target: "docstore::store", collection, "Dropping collection");
        self.backend.drop_collection(collection)
    }

    // ========== Reads ==========

    /// `None` when absent, `Decode` when present but not a `T`.
    pub fn find<T, C>(&self, collection: &str, codec: &C, id: &str) -> Result<Option<T>>
    where
        C: Codec<T> + ?Sized,
    {
        validate_collection_name(collection)?;
        validate_document_id(id)?;

        match self.backend.get(collection, id)? {
            Some(payload) => codec
                .decode(&payload)
                .map(Some)
                .map_err(|e| decode_error(collection, id, e)),
            None => Ok(None),
        }
    }

    /// Like `find`, but an absent document is `NotFound`.
    pub fn get<T, C>(&self, collection: &str, codec: &C, id: &str) -> Result<T>
    where
        C: Codec<T> + ?Sized,
    {
        self.find(collection, codec, id)?.ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }

    pub fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        validate_collection_name(collection)?;
        validate_document_id(id)?;
        Ok(self.backend.get(collection, id)?.is_some())
    }

    /// Decode every document in scan order.
    ///
    /// One undecodable document fails the whole call; nothing is skipped.
    pub fn get_all_documents<T, C>(&self, collection: &str, codec: &C) -> Result<Vec<T>>
    where
        C: Codec<T> + ?Sized,
    {
        let mut records = Vec::new();
        self.scan_decoded(collection, codec, |_, record| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    /// `get_all_documents` paired with ids.
    pub fn entries<T, C>(&self, collection: &str, codec: &C) -> Result<Vec<(String, T)>>
    where
        C: Codec<T> + ?Sized,
    {
        let mut entries = Vec::new();
        self.scan_decoded(collection, codec, |id, record| {
            entries.push((id, record));
            Ok(())
        })?;
        Ok(entries)
    }

    /// Records for which `predicate` holds, in scan order.
    pub fn query<T, C, P>(&self, collection: &str, codec: &C, mut predicate: P) -> Result<Vec<T>>
    where
        C: Codec<T> + ?Sized,
        P: FnMut(&T) -> bool,
    {
        let mut matched = Vec::new();
        self.scan_decoded(collection, codec, |_, record| {
            if predicate(&record) {
                matched.push(record);
            }
            Ok(())
        })?;
        Ok(matched)
    }

    /// Run a declarative `Query` against the JSON view of each record.
    pub fn find_where<T, C>(&self, collection: &str, codec: &C, query: &Query) -> Result<Vec<T>>
    where
        T: Serialize,
        C: Codec<T> + ?Sized,
    {
        let mut rows = Vec::new();
        self.scan_decoded(collection, codec, |id, record| {
            let view = serde_json::to_value(&record).map_err(|e| StoreError::Encode {
                collection: collection.to_string(),
                id: id.clone(),
                detail: e.to_string(),
            })?;
            rows.push(QueryRow { id, view, record });
            Ok(())
        })?;

        debug!(target: "docstore::store", collection, scanned = rows.len(), "Executing query");
        Ok(query.execute(rows))
    }

    pub fn list_ids(&self, collection: &str) -> Result<Vec<String>> {
        self.scan(collection)?
            .map(|entry| entry.map(|e| e.id))
            .collect()
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        validate_collection_name(collection)?;
        self.backend.count(collection)
    }

    /// Collections holding at least one document. A never-written collection
    /// is indistinguishable from an empty one.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        self.backend.list_collections()
    }

    /// Lazy scan of raw payloads, ascending by id.
    pub fn scan(&self, collection: &str) -> Result<Scan<'_, dyn Backend>> {
        validate_collection_name(collection)?;
        Ok(Scan::new(&*self.backend, collection, self.scan_batch_size))
    }

    // ========== Schema version ==========

    pub fn get_schema_version(&self) -> Result<u32> {
        self.registry().get_schema_version()
    }

    /// Committed migration steps, oldest first.
    pub fn version_history(&self) -> Result<Vec<VersionRecord>> {
        self.registry().history()
    }

    pub(super) fn registry(&self) -> SchemaVersionRegistry<'_, dyn Backend> {
        SchemaVersionRegistry::new(&*self.backend)
    }

    /// Decode each document in scan order and hand it to `visit`, stopping at
    /// the first error.
    pub(super) fn scan_decoded<T, C, F>(&self, collection: &str, codec: &C, mut visit: F) -> Result<()>
    where
        C: Codec<T> + ?Sized,
        F: FnMut(String, T) -> Result<()>,
    {
        for entry in self.scan(collection)? {
            let entry = entry?;
            let record = codec
                .decode(&entry.payload)
                .map_err(|e| decode_error(collection, &entry.id, e))?;
            visit(entry.id, record)?;
        }
        Ok(())
    }
}

pub(super) fn encode_record<T, C>(codec: &C, collection: &str, id: &str, record: &T) -> Result<Vec<u8>>
where
    C: Codec<T> + ?Sized,
{
    codec.encode(record).map_err(|e| StoreError::Encode {
        collection: collection.to_string(),
        id: id.to_string(),
        detail: e.detail,
    })
}

pub(super) fn decode_error(collection: &str, id: &str, err: CodecError) -> StoreError {
    StoreError::Decode {
        collection: collection.to_string(),
        id: id.to_string(),
        expected: err.expected,
        observed: err.observed,
        detail: err.detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Book {
        id: String,
        name: String,
        price: f64,
    }

    fn book(id: &str, name: &str, price: f64) -> Book {
        Book { id: id.to_string(), name: name.to_string(), price }
    }

    #[test]
    fn test_save_find_roundtrip() {
        let store = DocumentStore::in_memory();
        let codec = JsonCodec::<Book>::new();
        let dune = book("1", "Dune", 9.99);

        store.save("books", &codec, "1", &dune).unwrap();
        assert_eq!(store.find("books", &codec, "1").unwrap(), Some(dune));
        assert_eq!(store.find("books", &codec, "2").unwrap(), None);
    }

    #[test]
    fn test_save_overwrites() {
        let store = DocumentStore::in_memory();
        let codec = JsonCodec::<Book>::new();

        store.save("books", &codec, "1", &book("1", "Dune", 9.99)).unwrap();
        store.save("books", &codec, "1", &book("1", "Emma", 4.5)).unwrap();

        assert_eq!(store.count("books").unwrap(), 1);
        assert_eq!(store.get("books", &codec, "1").unwrap().name, "Emma");
    }

    #[test]
    fn test_update_and_missing() {
        let store = DocumentStore::in_memory();
        let codec = JsonCodec::<Book>::new();
        store.save("books", &codec, "1", &book("1", "Dune", 9.99)).unwrap();

        let updated = store
            .update("books", &codec, "1", |mut b: Book| {
                b.price = 5.0;
                b
            })
            .unwrap();
        assert_eq!(updated.price, 5.0);
        assert_eq!(store.get("books", &codec, "1").unwrap().price, 5.0);

        let err = store.update("books", &codec, "9", |b: Book| b).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = DocumentStore::in_memory();
        let codec = JsonCodec::<Book>::new();
        store.save("books", &codec, "1", &book("1", "Dune", 9.99)).unwrap();

        store.delete("books", "1").unwrap();
        store.delete("books", "1").unwrap();
        store.delete("books", "never").unwrap();
        assert!(!store.exists("books", "1").unwrap());
    }

    #[test]
    fn test_unknown_collection_is_empty() {
        let store = DocumentStore::in_memory();
        let codec = JsonCodec::<Book>::new();

        assert!(store.get_all_documents("ghosts", &codec).unwrap().is_empty());
        assert!(store.query("ghosts", &codec, |_| true).unwrap().is_empty());
        assert_eq!(store.count("ghosts").unwrap(), 0);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let store = DocumentStore::in_memory();
        let codec = JsonCodec::<Book>::new();
        let dune = book("1", "Dune", 9.99);

        assert!(matches!(
            store.save("_internal", &codec, "1", &dune),
            Err(StoreError::InvalidCollectionName(_))
        ));
        assert!(matches!(
            store.save("books", &codec, "", &dune),
            Err(StoreError::InvalidDocumentId(_))
        ));
    }

    #[test]
    fn test_insert_generates_distinct_ids() {
        let store = DocumentStore::in_memory();
        let codec = JsonCodec::<Book>::new();

        let a = store.insert("books", &codec, &book("a", "A", 1.0)).unwrap();
        let b = store.insert("books", &codec, &book("b", "B", 2.0)).unwrap();

        assert_ne!(a, b);
        assert_eq!(store.count("books").unwrap(), 2);
        assert_eq!(store.get("books", &codec, &a).unwrap().name, "A");
    }

    #[test]
    fn test_save_all_reports_invalid_ids_in_place() {
        let store = DocumentStore::in_memory();
        let codec = JsonCodec::<Book>::new();

        let report = store
            .save_all(
                "books",
                &codec,
                vec![
                    ("1", book("1", "A", 1.0)),
                    ("", book("", "B", 2.0)),
                    ("3", book("3", "C", 3.0)),
                ],
            )
            .unwrap();

        let ids: Vec<&str> = report.outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "", "3"]);
        assert_eq!(report.written(), vec!["1", "3"]);
        assert_eq!(report.failed(), vec![""]);
    }

    #[test]
    fn test_small_batches_scan_everything() {
        let store = DocumentStore::in_memory().with_scan_batch_size(2);
        let codec = JsonCodec::<Book>::new();
        for i in 0..5 {
            let id = i.to_string();
            store.save("books", &codec, &id, &book(&id, "x", i as f64)).unwrap();
        }

        assert_eq!(store.get_all_documents("books", &codec).unwrap().len(), 5);
        assert_eq!(store.list_ids("books").unwrap(), vec!["0", "1", "2", "3", "4"]);
    }
}
