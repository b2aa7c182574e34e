//! Document store error types

use thiserror::Error;

use crate::engine::config::ConfigError;
use crate::engine::database::DatabaseError;

/// Boxed error raised by a caller-supplied migration step.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Cannot decode {collection}/{id} as {expected} (observed {observed}): {detail}")]
    Decode {
        collection: String,
        id: String,
        expected: String,
        observed: String,
        detail: String,
    },

    #[error("Cannot encode {collection}/{id}: {detail}")]
    Encode {
        collection: String,
        id: String,
        detail: String,
    },

    #[error("Write rejected for {collection}/{id}: {detail}")]
    WriteFailure {
        collection: String,
        id: String,
        detail: String,
    },

    #[error("Read failed for {collection}/{id}: {detail}")]
    ReadFailure {
        collection: String,
        id: String,
        detail: String,
    },

    #[error("Storage failure on collection {collection}: {detail}")]
    CollectionFailure { collection: String, detail: String },

    #[error("Bulk write to {collection} incomplete: {succeeded} written, failed ids {failed:?}")]
    PartialWrite {
        collection: String,
        failed: Vec<String>,
        succeeded: usize,
    },

    #[error("Transform failed for {collection}/{id}: {source}")]
    TransformFailed {
        collection: String,
        id: String,
        #[source]
        source: StepError,
    },

    /// A collection rewrite stopped part-way. `rewritten` lists the ids
    /// already in the new shape, in scan order.
    #[error("Rewrite of {collection} stopped after {} documents: {source}", .rewritten.len())]
    RewriteIncomplete {
        collection: String,
        rewritten: Vec<String>,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Migration to version {version} aborted: {source}")]
    MigrationAborted {
        version: u32,
        #[source]
        source: StepError,
    },

    #[error("Migration already running (step {step})")]
    MigrationInProgress { step: u32 },

    #[error("Collection {collection} can only be rewritten inside a migration step")]
    NoActiveMigration { collection: String },

    #[error("Schema version cannot move backwards (current {current}, requested {requested})")]
    VersionRegression { current: u32, requested: u32 },

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Invalid document id: {0}")]
    InvalidDocumentId(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl StoreError {
    /// True when the error means a stored payload did not match the requested record type.
    pub fn is_decode(&self) -> bool {
        matches!(self, StoreError::Decode { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
