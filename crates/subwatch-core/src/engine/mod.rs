//! Core reconciliation engine
//!
//! The ReconcileEngine is responsible for:
//! - Loading the known world-state of a domain in one read
//! - Normalizing and deduplicating candidate hostnames
//! - Scanning every candidate via PortObserver, with bounded concurrency
//! - Diffing observed ports against stored ports
//! - Persisting one record per subdomain
//!
//! ## Architecture
//!
//! ```text
//!  candidates ──┐
//!               ▼
//!      ┌─────────────────┐   load_domain   ┌──────────────────┐
//!      │ ReconcileEngine │◄────────────────│ WorldStateStore  │
//!      └─────────────────┘──── upsert ────►└──────────────────┘
//!               │
//!       scan (≤ N in flight, each with a deadline)
//!               ▼
//!      ┌─────────────────┐
//!      │  PortObserver   │
//!      └─────────────────┘
//!               │
//!               ▼
//!           ChangeSet
//! ```
//!
//! ## Flow
//!
//! 1. Load every stored record for the domain
//! 2. Normalize candidates and match them against stored records
//! 3. Scan each candidate
//! 4. New candidate: insert, report as new
//! 5. Known candidate: update, report a port delta if one exists
//! 6. Failed commits are logged and listed, never reported as changes

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::changes::{ChangeSet, NewSubdomain, PortChange};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::hostname::{normalize_candidate, normalize_candidates};
use crate::model::{Observation, SubdomainRecord};
use crate::traits::{PortObserver, WorldStateStore};

/// Core reconciliation engine
///
/// Turns a set of candidate hostnames into a [`ChangeSet`] against the stored
/// world-state, committing every observation it makes.
///
/// ## Threading
///
/// One `reconcile()` call owns its loaded mapping. Concurrent calls for
/// different domains are safe; concurrent calls for the same domain race on
/// the store with last-write-wins.
pub struct ReconcileEngine {
    observer: Arc<dyn PortObserver>,
    store: Arc<dyn WorldStateStore>,
    scan_concurrency: usize,
    scan_timeout: Duration,
}

impl ReconcileEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// - `Ok(engine)`
    /// - `Err(Error::Config)`: invalid engine settings
    pub fn new(
        observer: Arc<dyn PortObserver>,
        store: Arc<dyn WorldStateStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            observer,
            store,
            scan_concurrency: config.scan_concurrency,
            scan_timeout: config.scan_timeout(),
        })
    }

    /// The store this engine commits to
    pub fn store(&self) -> &Arc<dyn WorldStateStore> {
        &self.store
    }

    /// Reconcile `candidates` for `domain` against the stored world-state
    ///
    /// # Returns
    ///
    /// - `Ok(ChangeSet)`: possibly empty; `failed` lists uncommitted subdomains
    /// - `Err(Error)`: the initial load failed, nothing was scanned
    pub async fn reconcile(&self, domain: &str, candidates: &BTreeSet<String>) -> Result<ChangeSet> {
        let stored = self.store.load_domain(domain).await?;
        let mut known = index_by_normalized_name(stored);

        let hosts = normalize_candidates(candidates);
        debug!(
            "Reconciling {} candidates for {} against {} stored records",
            hosts.len(),
            domain,
            known.len()
        );

        let mut changes = ChangeSet::new(domain);
        let mut pending: BTreeSet<String> = hosts.clone();
        let semaphore = Arc::new(Semaphore::new(self.scan_concurrency));
        let mut scans = JoinSet::new();

        for host in hosts {
            let observer = Arc::clone(&self.observer);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.scan_timeout;
            scans.spawn(async move {
                let observation = match semaphore.acquire_owned().await {
                    Ok(_permit) => observe(observer.as_ref(), &host, timeout).await,
                    Err(_) => Observation::unknown(),
                };
                (host, observation)
            });
        }

        while let Some(joined) = scans.join_next().await {
            match joined {
                Ok((host, observation)) => {
                    pending.remove(&host);
                    let previous = known.remove(&host);
                    self.commit(domain, &host, previous, &observation, &mut changes)
                        .await;
                }
                Err(e) => {
                    warn!("Scan task for {} failed: {}", domain, e);
                }
            }
        }

        // Hosts whose scan task died still get a heartbeat
        for host in pending {
            let previous = known.remove(&host);
            self.commit(domain, &host, previous, &Observation::unknown(), &mut changes)
                .await;
        }

        changes.sort();
        info!(
            "Reconciled {}: {} new, {} port changes, {} failed",
            domain,
            changes.new_subdomains.len(),
            changes.port_changes.len(),
            changes.failed.len()
        );

        Ok(changes)
    }

    /// Build, persist and classify one record
    async fn commit(
        &self,
        domain: &str,
        host: &str,
        previous: Option<SubdomainRecord>,
        observation: &Observation,
        changes: &mut ChangeSet,
    ) {
        let now = Utc::now();

        match previous {
            None => {
                let record = SubdomainRecord::from_observation(domain, host, observation, now);
                match self.store.upsert(&record).await {
                    Ok(()) => {
                        info!(
                            "New subdomain {} ({}, ports {:?})",
                            host, record.reachable, record.open_ports
                        );
                        changes.new_subdomains.push(NewSubdomain {
                            subdomain: host.to_string(),
                            state: record,
                        });
                    }
                    Err(e) => {
                        error!("Failed to persist new subdomain {}: {}", host, e);
                        changes.failed.push(host.to_string());
                    }
                }
            }
            Some(previous) => {
                // Record keeps its stored key, including legacy case or trailing dot
                let mut record = previous.clone();
                record.apply_observation(observation, now);
                let delta = PortChange::between(host, &previous, &record);

                match self.store.upsert(&record).await {
                    Ok(()) => match delta {
                        Some(change) => {
                            info!(
                                "Port change on {}: opened {:?}, closed {:?}",
                                host, change.newly_opened, change.newly_closed
                            );
                            changes.port_changes.push(change);
                        }
                        None => {
                            debug!("No port change on {}, heartbeat recorded", host);
                        }
                    },
                    Err(e) => {
                        error!("Failed to persist update for {}: {}", host, e);
                        changes.failed.push(host.to_string());
                    }
                }
            }
        }
    }
}

/// Scan one host, degrading errors and timeouts to an unknown observation
async fn observe(observer: &dyn PortObserver, host: &str, timeout: Duration) -> Observation {
    match tokio::time::timeout(timeout, observer.scan(host)).await {
        Ok(Ok(observation)) => observation,
        Ok(Err(e)) => {
            warn!(
                "Observer {} failed on {}: {}",
                observer.observer_name(),
                host,
                e
            );
            Observation::unknown()
        }
        Err(_) => {
            warn!(
                "Observer {} timed out on {} after {}s",
                observer.observer_name(),
                host,
                timeout.as_secs()
            );
            Observation::unknown()
        }
    }
}

/// Key stored records by normalized subdomain.
///
/// Keys are lowercased without a trailing dot. When a legacy database holds
/// both `a.example.com` and `A.example.com.`, the record stored under the
/// normalized key wins.
fn index_by_normalized_name(records: Vec<SubdomainRecord>) -> HashMap<String, SubdomainRecord> {
    let mut known: HashMap<String, SubdomainRecord> = HashMap::with_capacity(records.len());

    for record in records {
        let Some(key) = normalize_candidate(&record.subdomain) else {
            warn!("Ignoring stored record with invalid name {:?}", record.subdomain);
            continue;
        };

        match known.get(&key) {
            Some(existing) if existing.subdomain == key => {
                warn!(
                    "Duplicate stored record {:?} shadowed by {:?}",
                    record.subdomain, existing.subdomain
                );
            }
            _ => {
                known.insert(key, record);
            }
        }
    }

    known
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObservedPort, Reachability};
    use crate::state::MemoryWorldStore;
    use async_trait::async_trait;

    struct FixedObserver(HashMap<String, Observation>);

    #[async_trait]
    impl PortObserver for FixedObserver {
        async fn scan(&self, host: &str) -> Result<Observation> {
            self.0
                .get(host)
                .cloned()
                .ok_or_else(|| crate::Error::observer(format!("no script for {}", host)))
        }

        fn observer_name(&self) -> &'static str {
            "fixed"
        }
    }

    fn up(ports: &[u16]) -> Observation {
        Observation::up("10.0.0.1", ports.iter().map(|p| ObservedPort::new(*p)).collect())
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_index_prefers_normalized_key() {
        let obs = up(&[80]);
        let now = Utc::now();
        let legacy = SubdomainRecord::from_observation("ex.com", "a.ex.com.", &obs, now);
        let current = SubdomainRecord::from_observation("ex.com", "a.ex.com", &obs, now);

        let known = index_by_normalized_name(vec![current.clone(), legacy.clone()]);
        assert_eq!(known.len(), 1);
        assert_eq!(known["a.ex.com"].subdomain, "a.ex.com");

        let known = index_by_normalized_name(vec![legacy, current]);
        assert_eq!(known["a.ex.com"].subdomain, "a.ex.com");
    }

    #[test]
    fn test_index_folds_case() {
        let obs = up(&[80]);
        let now = Utc::now();
        let shouted = SubdomainRecord::from_observation("ex.com", "A.ex.com", &obs, now);
        let current = SubdomainRecord::from_observation("ex.com", "a.ex.com", &obs, now);

        let known = index_by_normalized_name(vec![shouted.clone()]);
        assert_eq!(known["a.ex.com"].subdomain, "A.ex.com");

        let known = index_by_normalized_name(vec![current, shouted]);
        assert_eq!(known.len(), 1);
        assert_eq!(known["a.ex.com"].subdomain, "a.ex.com");
    }

    #[tokio::test]
    async fn test_unscripted_host_degrades_to_unknown() {
        let store = Arc::new(MemoryWorldStore::new());
        let engine = ReconcileEngine::new(
            Arc::new(FixedObserver(HashMap::new())),
            store.clone(),
            EngineConfig::default(),
        )
        .unwrap();

        let changes = engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();

        assert_eq!(changes.new_subdomains.len(), 1);
        let state = &changes.new_subdomains[0].state;
        assert_eq!(state.reachable, Reachability::Unknown);
        assert!(state.open_ports.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = EngineConfig {
            scan_concurrency: 0,
            ..EngineConfig::default()
        };
        let result = ReconcileEngine::new(
            Arc::new(FixedObserver(HashMap::new())),
            Arc::new(MemoryWorldStore::new()),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_updates_last_scanned() {
        let store = Arc::new(MemoryWorldStore::new());
        let mut script = HashMap::new();
        script.insert("a.ex.com".to_string(), up(&[80]));
        let engine = ReconcileEngine::new(
            Arc::new(FixedObserver(script)),
            store.clone(),
            EngineConfig::default(),
        )
        .unwrap();

        engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();
        let first = store.get("ex.com", "a.ex.com").await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let changes = engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();
        let second = store.get("ex.com", "a.ex.com").await.unwrap().unwrap();

        assert!(changes.is_empty());
        assert_eq!(second.first_seen_at, first.first_seen_at);
        assert!(second.last_scanned_at > first.last_scanned_at);
    }
}
