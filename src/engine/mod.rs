// Document store engine - core module structure
pub mod config;
pub mod database;
pub mod docstore;

pub use config::StoreConfig;
pub use database::Database;
pub use docstore::DocumentStore;
