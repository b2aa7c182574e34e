//! Typed document store
//!
//! Caller-defined record types stored in named collections, with:
//! - Pluggable codecs binding each record type to its payload
//! - Closure and declarative queries over full-collection scans
//! - A single store-wide schema version
//! - Step-by-step migrations that rewrite collections in place

pub mod codec;
pub mod collection;
pub mod error;
pub mod migration;
pub mod query;
pub mod registry;
pub mod storage;
pub mod store;

pub use codec::{Codec, CodecError, JsonCodec};
pub use collection::Collection;
pub use error::{Result, StepError, StoreError};
pub use migration::{MigrationOutcome, MigrationState};
pub use query::{Filter, FilterOp, Query};
pub use registry::SchemaVersionRegistry;
pub use storage::{
    Backend, BulkWriteReport, CollectionStorage, EntryOutcome, MemoryStorage, Scan, StoredEntry,
    VersionRecord, VersionStore,
};
pub use store::DocumentStore;
