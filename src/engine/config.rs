//! Store configuration
//! Handles loading and validating docstore.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "docstore.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Documents fetched per page during full-collection scans
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
}

fn default_pool_size() -> u32 {
    4
}

fn default_scan_batch_size() -> usize {
    256
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("docstore").join("store.db"))
        .unwrap_or_else(|| PathBuf::from("./data/store.db"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::sqlite(default_db_path())
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            backend: BackendConfig::Memory,
            pool_size: default_pool_size(),
            scan_batch_size: default_scan_batch_size(),
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Sqlite { path: path.into() },
            pool_size: default_pool_size(),
            scan_batch_size: default_scan_batch_size(),
        }
    }

    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: StoreConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}
