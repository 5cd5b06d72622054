use std::sync::Arc;

use tracing::info;

use strand_core::config::{AppConfig, StoreBackend};
use strand_core::error::Result;
use strand_core::traits::RunStore;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Open the store selected by `[store]` in the config.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn RunStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory run store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = config.store_path();
            info!(path = %path.display(), "Using SQLite run store");
            Ok(Arc::new(SqliteStore::open(&path)?))
        }
    }
}
