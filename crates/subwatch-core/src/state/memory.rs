// # Memory World Store
//
// In-memory implementation of WorldStateStore.
//
// ## Purpose
//
// A fast store that doesn't persist across restarts. Used by tests and by
// ephemeral runs (`SUBWATCH_STORE_TYPE=memory`).
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - The first pass after a restart reports every subdomain as new

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::model::SubdomainRecord;
use crate::traits::WorldStateStore;
use crate::Error;

type Key = (String, String);

/// In-memory world-state store
///
/// Records live in a HashMap keyed by `(domain, subdomain)`, protected by a
/// RwLock. Clones share the same map.
///
/// # Example
///
/// ```rust,no_run
/// use subwatch_core::state::MemoryWorldStore;
/// use subwatch_core::WorldStateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryWorldStore::new();
///     let records = store.load_domain("example.com").await?;
///     assert!(records.is_empty());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryWorldStore {
    inner: Arc<RwLock<HashMap<Key, SubdomainRecord>>>,
}

impl MemoryWorldStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Write a record verbatim, bypassing upsert semantics
    ///
    /// Lets tests seed legacy or inconsistent state.
    pub async fn insert_raw(&self, record: SubdomainRecord) {
        let key = (record.domain.clone(), record.subdomain.clone());
        self.inner.write().await.insert(key, record);
    }
}

#[async_trait]
impl WorldStateStore for MemoryWorldStore {
    async fn load_domain(&self, domain: &str) -> Result<Vec<SubdomainRecord>, Error> {
        let guard = self.inner.read().await;
        let mut records: Vec<SubdomainRecord> = guard
            .values()
            .filter(|r| r.domain == domain)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));
        Ok(records)
    }

    async fn get(&self, domain: &str, subdomain: &str) -> Result<Option<SubdomainRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(&(domain.to_string(), subdomain.to_string()))
            .cloned())
    }

    async fn upsert(&self, record: &SubdomainRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let key = (record.domain.clone(), record.subdomain.clone());

        let mut stored = record.clone();
        stored.prune_services();
        if let Some(existing) = guard.get(&key) {
            stored.first_seen_at = existing.first_seen_at;
        }
        guard.insert(key, stored);
        Ok(())
    }

    async fn domains(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        let mut domains: Vec<String> = guard.keys().map(|(d, _)| d.clone()).collect();
        domains.sort();
        domains.dedup();
        Ok(domains)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}
