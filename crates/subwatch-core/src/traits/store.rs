// # World-State Store Trait
//
// Defines the interface for persistent per-(domain, subdomain) state.
//
// ## Purpose
//
// The store remembers the last observation of every subdomain so the engine
// can tell what changed between passes:
// - When a subdomain was first seen (immutable)
// - When it was last scanned
// - Its address, reachability, open ports and services
//
// ## Implementations
//
// - In-memory: `MemoryWorldStore`
// - SQLite: `SqliteWorldStore`
//
// ## Usage
//
// ```rust,ignore
// use subwatch_core::WorldStateStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* WorldStateStore implementation */;
//
//     // One read per domain
//     let known = store.load_domain("example.com").await?;
//
//     // One commit per subdomain
//     for record in &known {
//         store.upsert(record).await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::SubdomainRecord;

/// Trait for world-state store implementations
///
/// # Idempotency
///
/// `upsert()` is keyed by `(domain, subdomain)`. Calling it any number of
/// times with the same key leaves exactly one record. An existing record's
/// `first_seen_at` is never overwritten.
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
/// Concurrent upserts for different keys must not conflict; upserts for the
/// same key serialize with last-write-wins.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage (files, databases)
/// - ✅ Implement locking/concurrency control for thread safety
/// - ✅ Repair stored data that violates record invariants on read
///
/// ## Forbidden Capabilities
/// - ❌ Computing deltas (owned by `ReconcileEngine`)
/// - ❌ Scanning hosts (owned by `PortObserver`)
/// - ❌ Spawning background tasks without a clear lifecycle
#[async_trait]
pub trait WorldStateStore: Send + Sync {
    /// Load every record of a root domain in one read
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<SubdomainRecord>)`: all records (possibly empty)
    /// - `Err(Error)`: storage error
    async fn load_domain(&self, domain: &str) -> Result<Vec<SubdomainRecord>, crate::Error>;

    /// Get a single record
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: the stored record
    /// - `Ok(None)`: never seen
    /// - `Err(Error)`: storage error
    async fn get(
        &self,
        domain: &str,
        subdomain: &str,
    ) -> Result<Option<SubdomainRecord>, crate::Error>;

    /// Insert or update a record, committed on return
    ///
    /// # Returns
    ///
    /// - `Ok(())`: durably written
    /// - `Err(Error)`: nothing was written for this record
    async fn upsert(&self, record: &SubdomainRecord) -> Result<(), crate::Error>;

    /// List root domains that have stored records
    async fn domains(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    ///
    /// Called once at shutdown.
    async fn flush(&self) -> Result<(), crate::Error>;
}
