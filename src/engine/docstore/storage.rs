//! Persistence seam for the document store
//!
//! Backends only deal in opaque payloads keyed by (collection, id). Typing
//! happens above this layer, in the codec.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Result, StoreError};

/// One stored document as seen by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub id: String,
    pub payload: Vec<u8>,
}

/// A committed schema version and when it was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u32,
    pub applied_at: DateTime<Utc>,
}

/// Per-collection key/payload storage.
///
/// Every write is atomic for its own key only. `put_all` is a best-effort
/// loop unless a backend overrides it with something stronger.
pub trait CollectionStorage: Send + Sync {
    /// Insert or overwrite one payload.
    fn put(&self, collection: &str, id: &str, payload: &[u8]) -> Result<()>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Vec<u8>>>;

    /// Remove one payload. Absent ids are not an error.
    fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Up to `limit` entries with id strictly greater than `after`, ascending by id.
    fn scan_page(&self, collection: &str, after: Option<&str>, limit: usize) -> Result<Vec<StoredEntry>>;

    fn count(&self, collection: &str) -> Result<usize>;

    /// Names of collections holding at least one document.
    fn list_collections(&self) -> Result<Vec<String>>;

    /// Remove every document in a collection. Idempotent.
    fn drop_collection(&self, collection: &str) -> Result<()>;

    fn put_all(&self, collection: &str, entries: &[(String, Vec<u8>)]) -> BulkWriteReport {
        let mut report = BulkWriteReport::new(collection);
        for (id, payload) in entries {
            let result = self.put(collection, id, payload);
            report.record(id.clone(), result);
        }
        report
    }
}

/// Storage for the store-wide schema version.
pub trait VersionStore: Send + Sync {
    /// `None` for a store that has never committed a version.
    fn load_version(&self) -> Result<Option<u32>>;

    /// Persist `version` and append it to the journal.
    fn commit_version(&self, version: u32, applied_at: DateTime<Utc>) -> Result<()>;

    /// Committed versions, oldest first.
    fn version_journal(&self) -> Result<Vec<VersionRecord>>;
}

/// Everything a document store needs from its persistence engine.
pub trait Backend: CollectionStorage + VersionStore {}

impl<B: CollectionStorage + VersionStore> Backend for B {}

/// Outcome of writing one entry in a bulk operation.
#[derive(Debug)]
pub struct EntryOutcome {
    pub id: String,
    pub result: Result<()>,
}

/// Per-entry results of a bulk write, in input order.
#[derive(Debug)]
pub struct BulkWriteReport {
    pub collection: String,
    pub outcomes: Vec<EntryOutcome>,
}

impl BulkWriteReport {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, id: String, result: Result<()>) {
        self.outcomes.push(EntryOutcome { id, result });
    }

    /// Ids that were written.
    pub fn written(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.id.as_str())
            .collect()
    }

    /// Ids that were not written.
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.id.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Collapse into the number of written entries, or a `PartialWrite` error.
    pub fn into_result(self) -> Result<usize> {
        let failed: Vec<String> = self
            .outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.id.clone())
            .collect();

        if failed.is_empty() {
            return Ok(self.outcomes.len());
        }

        Err(StoreError::PartialWrite {
            succeeded: self.outcomes.len() - failed.len(),
            collection: self.collection,
            failed,
        })
    }
}

/// Lazy full scan of one collection.
///
/// Fetches pages of `batch_size` entries on demand, keyed on the last id
/// seen, so writes to already-visited ids do not disturb the scan.
pub struct Scan<'a, S: ?Sized> {
    storage: &'a S,
    collection: String,
    batch_size: usize,
    cursor: Option<String>,
    page: std::vec::IntoIter<StoredEntry>,
    exhausted: bool,
}

impl<'a, S: CollectionStorage + ?Sized> Scan<'a, S> {
    pub fn new(storage: &'a S, collection: &str, batch_size: usize) -> Self {
        Self {
            storage,
            collection: collection.to_string(),
            batch_size: batch_size.max(1),
            cursor: None,
            page: Vec::new().into_iter(),
            exhausted: false,
        }
    }

    fn fetch_page(&mut self) -> Result<bool> {
        let entries = self
            .storage
            .scan_page(&self.collection, self.cursor.as_deref(), self.batch_size)?;

        if entries.len() < self.batch_size {
            self.exhausted = true;
        }
        match entries.last() {
            Some(last) => self.cursor = Some(last.id.clone()),
            None => return Ok(false),
        }

        self.page = entries.into_iter();
        Ok(true)
    }
}

impl<S: CollectionStorage + ?Sized> Iterator for Scan<'_, S> {
    type Item = Result<StoredEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entry) = self.page.next() {
            return Some(Ok(entry));
        }
        if self.exhausted {
            return None;
        }

        match self.fetch_page() {
            Ok(true) => self.page.next().map(Ok),
            Ok(false) => None,
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    version: Option<u32>,
    journal: Vec<VersionRecord>,
}

/// In-process backend. Nothing survives the value being dropped.
#[derive(Default)]
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&MemoryState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl CollectionStorage for MemoryStorage {
    fn put(&self, collection: &str, id: &str, payload: &[u8]) -> Result<()> {
        self.write(|state| {
            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), payload.to_vec());
        });
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read(|state| {
            state
                .collections
                .get(collection)
                .and_then(|docs| docs.get(id))
                .cloned()
        }))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.write(|state| {
            if let Some(docs) = state.collections.get_mut(collection) {
                docs.remove(id);
                if docs.is_empty() {
                    state.collections.remove(collection);
                }
            }
        });
        Ok(())
    }

    fn scan_page(&self, collection: &str, after: Option<&str>, limit: usize) -> Result<Vec<StoredEntry>> {
        use std::ops::Bound;

        Ok(self.read(|state| {
            let Some(docs) = state.collections.get(collection) else {
                return Vec::new();
            };
            let lower = match after {
                Some(id) => Bound::Excluded(id.to_string()),
                None => Bound::Unbounded,
            };
            docs.range((lower, Bound::Unbounded))
                .take(limit)
                .map(|(id, payload)| StoredEntry {
                    id: id.clone(),
                    payload: payload.clone(),
                })
                .collect()
        }))
    }

    fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.read(|state| state.collections.get(collection).map_or(0, BTreeMap::len)))
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.read(|state| state.collections.keys().cloned().collect()))
    }

    fn drop_collection(&self, collection: &str) -> Result<()> {
        self.write(|state| {
            state.collections.remove(collection);
        });
        Ok(())
    }
}

impl VersionStore for MemoryStorage {
    fn load_version(&self) -> Result<Option<u32>> {
        Ok(self.read(|state| state.version))
    }

    fn commit_version(&self, version: u32, applied_at: DateTime<Utc>) -> Result<()> {
        self.write(|state| {
            state.version = Some(version);
            state.journal.push(VersionRecord { version, applied_at });
        });
        Ok(())
    }

    fn version_journal(&self) -> Result<Vec<VersionRecord>> {
        Ok(self.read(|state| state.journal.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(n: usize) -> MemoryStorage {
        let storage = MemoryStorage::new();
        for i in 0..n {
            storage
                .put("items", &format!("{:03}", i), format!("{i}").as_bytes())
                .unwrap();
        }
        storage
    }

    #[test]
    fn test_memory_crud() {
        let storage = MemoryStorage::new();
        storage.put("users", "1", b"a").unwrap();
        assert_eq!(storage.get("users", "1").unwrap(), Some(b"a".to_vec()));

        storage.put("users", "1", b"b").unwrap();
        assert_eq!(storage.get("users", "1").unwrap(), Some(b"b".to_vec()));

        storage.delete("users", "1").unwrap();
        storage.delete("users", "1").unwrap();
        assert_eq!(storage.get("users", "1").unwrap(), None);
        assert!(storage.list_collections().unwrap().is_empty());
    }

    #[test]
    fn test_scan_spans_pages() {
        let storage = seeded(7);
        let ids: Vec<String> = Scan::new(&storage, "items", 3)
            .map(|e| e.unwrap().id)
            .collect();

        assert_eq!(ids, vec!["000", "001", "002", "003", "004", "005", "006"]);
    }

    #[test]
    fn test_scan_exact_page_multiple() {
        let storage = seeded(6);
        assert_eq!(Scan::new(&storage, "items", 3).count(), 6);
    }

    #[test]
    fn test_scan_missing_collection_is_empty() {
        let storage = MemoryStorage::new();
        assert_eq!(Scan::new(&storage, "nothing", 10).count(), 0);
    }

    #[test]
    fn test_scan_is_restartable() {
        let storage = seeded(4);
        let first: Vec<_> = Scan::new(&storage, "items", 2).map(|e| e.unwrap()).collect();
        let second: Vec<_> = Scan::new(&storage, "items", 2).map(|e| e.unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_version_journal() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load_version().unwrap(), None);

        storage.commit_version(1, Utc::now()).unwrap();
        storage.commit_version(2, Utc::now()).unwrap();

        assert_eq!(storage.load_version().unwrap(), Some(2));
        let versions: Vec<u32> = storage.version_journal().unwrap().iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn test_report_into_result() {
        let mut report = BulkWriteReport::new("users");
        report.record("1".to_string(), Ok(()));
        report.record(
            "2".to_string(),
            Err(StoreError::WriteFailure {
                collection: "users".to_string(),
                id: "2".to_string(),
                detail: "disk full".to_string(),
            }),
        );

        assert_eq!(report.written(), vec!["1"]);
        assert_eq!(report.failed(), vec!["2"]);
        match report.into_result() {
            Err(StoreError::PartialWrite { failed, succeeded, .. }) => {
                assert_eq!(failed, vec!["2".to_string()]);
                assert_eq!(succeeded, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
