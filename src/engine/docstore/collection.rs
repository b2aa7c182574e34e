//! Collection handles
//!
//! A `Collection` binds a store, a collection name and a codec so call sites
//! do not repeat them. Collections need no creation step: the first write
//! makes one, and an unwritten collection reads as empty.

use std::marker::PhantomData;

use serde::Serialize;

use super::codec::{Codec, JsonCodec};
use super::error::{Result, StoreError};
use super::query::Query;
use super::storage::BulkWriteReport;
use super::store::DocumentStore;

pub struct Collection<'s, T, C = JsonCodec<T>> {
    store: &'s DocumentStore,
    name: String,
    codec: C,
    _record: PhantomData<fn() -> T>,
}

impl<'s, T, C> Collection<'s, T, C> {
    pub(super) fn new(store: &'s DocumentStore, name: &str, codec: C) -> Self {
        Self {
            store,
            name: name.to_string(),
            codec,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }
}

impl<T, C: Codec<T>> Collection<'_, T, C> {
    pub fn save(&self, id: &str, record: &T) -> Result<()> {
        self.store.save(&self.name, &self.codec, id, record)
    }

    pub fn save_all<K, I>(&self, records: I) -> Result<BulkWriteReport>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        self.store.save_all(&self.name, &self.codec, records)
    }

    pub fn insert(&self, record: &T) -> Result<String> {
        self.store.insert(&self.name, &self.codec, record)
    }

    pub fn find(&self, id: &str) -> Result<Option<T>> {
        self.store.find(&self.name, &self.codec, id)
    }

    pub fn get(&self, id: &str) -> Result<T> {
        self.store.get(&self.name, &self.codec, id)
    }

    pub fn update(&self, id: &str, transform: impl FnOnce(T) -> T) -> Result<T> {
        self.store.update(&self.name, &self.codec, id, transform)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(&self.name, id)
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        self.store.exists(&self.name, id)
    }

    pub fn all(&self) -> Result<Vec<T>> {
        self.store.get_all_documents(&self.name, &self.codec)
    }

    pub fn entries(&self) -> Result<Vec<(String, T)>> {
        self.store.entries(&self.name, &self.codec)
    }

    pub fn query(&self, predicate: impl FnMut(&T) -> bool) -> Result<Vec<T>> {
        self.store.query(&self.name, &self.codec, predicate)
    }

    pub fn count(&self) -> Result<usize> {
        self.store.count(&self.name)
    }

    pub fn list_ids(&self) -> Result<Vec<String>> {
        self.store.list_ids(&self.name)
    }

    /// Remove every document in this collection.
    pub fn clear(&self) -> Result<()> {
        self.store.drop_collection(&self.name)
    }
}

impl<T: Serialize, C: Codec<T>> Collection<'_, T, C> {
    pub fn find_where(&self, query: &Query) -> Result<Vec<T>> {
        self.store.find_where(&self.name, &self.codec, query)
    }
}

/// Validate collection name
pub(crate) fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidCollectionName("name cannot be empty".to_string()));
    }

    if name.starts_with('_') {
        return Err(StoreError::InvalidCollectionName(format!(
            "{name}: names starting with underscore are reserved"
        )));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(StoreError::InvalidCollectionName(format!(
            "{name}: only ASCII letters, digits, '_' and '-' are allowed"
        )));
    }

    Ok(())
}

pub(crate) fn validate_document_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(StoreError::InvalidDocumentId("id cannot be empty".to_string()));
    }
    Ok(())
}
