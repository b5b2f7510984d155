// # World Store Implementations
//
// This module provides implementations of the WorldStateStore trait for
// different persistence strategies.

pub mod memory;
mod migrations;
pub mod sqlite;

pub use memory::MemoryWorldStore;
pub use sqlite::SqliteWorldStore;

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::traits::WorldStateStore;

/// Open the store described by `config`
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn WorldStateStore>, crate::Error> {
    match config {
        StoreConfig::Sqlite { path } => Ok(Arc::new(SqliteWorldStore::open(path)?)),
        StoreConfig::Memory => Ok(Arc::new(MemoryWorldStore::new())),
    }
}
