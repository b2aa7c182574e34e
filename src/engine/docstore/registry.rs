//! Schema version registry
//!
//! Holds the single store-wide schema version. A store that has never been
//! migrated reads as version 0.

use chrono::Utc;

use super::error::{Result, StoreError};
use super::storage::{VersionRecord, VersionStore};

pub struct SchemaVersionRegistry<'a, V: ?Sized> {
    store: &'a V,
}

impl<'a, V: VersionStore + ?Sized> SchemaVersionRegistry<'a, V> {
    pub fn new(store: &'a V) -> Self {
        Self { store }
    }

    pub fn get_schema_version(&self) -> Result<u32> {
        Ok(self.store.load_version()?.unwrap_or(0))
    }

    /// Persist `version`. Rewriting the current version is a no-op;
    /// moving backwards is rejected.
    pub fn set_schema_version(&self, version: u32) -> Result<()> {
        let current = self.get_schema_version()?;
        if version < current {
            return Err(StoreError::VersionRegression {
                current,
                requested: version,
            });
        }
        if version == current && self.store.load_version()?.is_some() {
            return Ok(());
        }
        self.store.commit_version(version, Utc::now())
    }

    pub fn history(&self) -> Result<Vec<VersionRecord>> {
        self.store.version_journal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::docstore::storage::MemoryStorage;

    #[test]
    fn test_fresh_store_is_version_zero() {
        let storage = MemoryStorage::new();
        let registry = SchemaVersionRegistry::new(&storage);
        assert_eq!(registry.get_schema_version().unwrap(), 0);
        assert!(registry.history().unwrap().is_empty());
    }

    #[test]
    fn test_version_only_moves_forward() {
        let storage = MemoryStorage::new();
        let registry = SchemaVersionRegistry::new(&storage);

        registry.set_schema_version(3).unwrap();
        registry.set_schema_version(3).unwrap();
        assert_eq!(registry.history().unwrap().len(), 1);

        let err = registry.set_schema_version(2).unwrap_err();
        assert!(matches!(err, StoreError::VersionRegression { current: 3, requested: 2 }));
        assert_eq!(registry.get_schema_version().unwrap(), 3);
    }
}
