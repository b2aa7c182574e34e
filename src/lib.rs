//! docstore - embedded typed document store
//!
//! Stores caller-defined records in named collections on top of a plain
//! key/payload backend (in-memory or SQLite), and migrates stored records
//! between shapes as the store's schema version advances.
//!
//! ```no_run
//! use docstore::{DocumentStore, JsonCodec, StoreConfig, StoreError};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct UserV1 { id: String, name: String }
//!
//! #[derive(Serialize, Deserialize)]
//! struct User { id: String, name: String, age: u32 }
//!
//! # fn main() -> Result<(), StoreError> {
//! let store = DocumentStore::open(&StoreConfig::default())?;
//! store.migrate_if_needed(1, |version| {
//!     if version == 1 {
//!         store.migrate_collection(
//!             "users",
//!             &JsonCodec::<UserV1>::new(),
//!             &JsonCodec::<User>::new(),
//!             |old: UserV1| User { id: old.id, name: old.name, age: 0 },
//!         )?;
//!     }
//!     Ok::<_, StoreError>(())
//! })?;
//!
//! let users = store.collection::<User>("users");
//! let adults = users.query(|u| u.age >= 18)?;
//! # let _ = adults;
//! # Ok(())
//! # }
//! ```

pub mod engine;

pub use engine::config::{BackendConfig, ConfigError, StoreConfig};
pub use engine::database::{Database, DatabaseError};
pub use engine::docstore::*;
