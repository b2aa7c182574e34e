#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use docstore::{
    CollectionStorage, MemoryStorage, StoreError, StoredEntry, VersionRecord,
    VersionStore,
};
use serde::{Deserialize, Serialize};

/// Split a step abort caused by a part-way collection rewrite into the
/// collection, the ids already rewritten and the error that stopped it.
pub fn rewrite_failure(err: StoreError) -> (String, Vec<String>, StoreError) {
    let source = match err {
        StoreError::MigrationAborted { source, .. } => source,
        other => panic!("expected MigrationAborted, got {other:?}"),
    };
    match *source.downcast::<StoreError>().unwrap() {
        StoreError::RewriteIncomplete { collection, rewritten, source } => (collection, rewritten, *source),
        other => panic!("expected RewriteIncomplete, got {other:?}"),
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOld {
    pub id: String,
    pub name: String,
    pub phone: i64,
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub phone: i64,
    pub books: Vec<Book>,
    pub age: u32,
}

pub fn old_user(id: &str, name: &str, phone: i64) -> UserOld {
    UserOld {
        id: id.to_string(),
        name: name.to_string(),
        phone,
        books: Vec::new(),
    }
}

pub fn user(id: &str, name: &str, age: u32) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        phone: 555,
        books: Vec::new(),
        age,
    }
}

/// Memory backend that rejects writes for chosen ids and can refuse version commits.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    rejected: Mutex<HashSet<String>>,
    refuse_commit: Mutex<bool>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_writes_for(&self, id: &str) {
        self.rejected.lock().unwrap().insert(id.to_string());
    }

    pub fn allow_all_writes(&self) {
        self.rejected.lock().unwrap().clear();
    }

    pub fn refuse_version_commits(&self, refuse: bool) {
        *self.refuse_commit.lock().unwrap() = refuse;
    }
}

impl CollectionStorage for FlakyStorage {
    fn put(&self, collection: &str, id: &str, payload: &[u8]) -> docstore::Result<()> {
        if self.rejected.lock().unwrap().contains(id) {
            return Err(StoreError::WriteFailure {
                collection: collection.to_string(),
                id: id.to_string(),
                detail: "injected failure".to_string(),
            });
        }
        self.inner.put(collection, id, payload)
    }

    fn get(&self, collection: &str, id: &str) -> docstore::Result<Option<Vec<u8>>> {
        self.inner.get(collection, id)
    }

    fn delete(&self, collection: &str, id: &str) -> docstore::Result<()> {
        self.inner.delete(collection, id)
    }

    fn scan_page(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
    ) -> docstore::Result<Vec<StoredEntry>> {
        self.inner.scan_page(collection, after, limit)
    }

    fn count(&self, collection: &str) -> docstore::Result<usize> {
        self.inner.count(collection)
    }

    fn list_collections(&self) -> docstore::Result<Vec<String>> {
        self.inner.list_collections()
    }

    fn drop_collection(&self, collection: &str) -> docstore::Result<()> {
        self.inner.drop_collection(collection)
    }
}

impl VersionStore for FlakyStorage {
    fn load_version(&self) -> docstore::Result<Option<u32>> {
        self.inner.load_version()
    }

    fn commit_version(&self, version: u32, applied_at: DateTime<Utc>) -> docstore::Result<()> {
        if *self.refuse_commit.lock().unwrap() {
            return Err(StoreError::WriteFailure {
                collection: "_schema".to_string(),
                id: version.to_string(),
                detail: "injected failure".to_string(),
            });
        }
        self.inner.commit_version(version, applied_at)
    }

    fn version_journal(&self) -> docstore::Result<Vec<VersionRecord>> {
        self.inner.version_journal()
    }
}
