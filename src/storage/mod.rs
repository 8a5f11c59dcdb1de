//! Storage for configuration and cache generations.

pub mod cache;
pub mod config;
pub mod paths;
pub mod schema;
pub mod sqlite;

use std::sync::Arc;

pub use cache::{CacheEntry, CacheStore, MemoryCacheStore};
pub use config::{
    Config, ConfigSource, ConfigSources, ENV_CONFIG, ENV_LISTEN, ENV_ORIGIN, ENV_TIMEOUT,
    ResolvedConfig, StorageBackend,
};
pub use paths::AppPaths;
pub use schema::run_migrations;
pub use sqlite::SqliteCacheStore;

use crate::error::Result;

/// Open the cache store selected by the configuration.
///
/// # Errors
/// Returns an error if the `SQLite` database cannot be opened or migrated.
pub fn open_store(config: &ResolvedConfig) -> Result<Arc<dyn CacheStore>> {
    match config.config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryCacheStore::new())),
        StorageBackend::Sqlite => {
            let path = config.database_path();
            tracing::debug!(path = %path.display(), "opening cache database");
            Ok(Arc::new(SqliteCacheStore::open(&path)?))
        }
    }
}
