//! Test doubles and common utilities for contract tests
//!
//! These doubles script the outside world (observers, sources, validators,
//! notifiers) and instrument the store so tests can assert on what the core
//! did without any network or subprocess.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use subwatch_core::error::Result;
use subwatch_core::summary::Report;
use subwatch_core::{
    EngineConfig, Error, HostValidator, MemoryWorldStore, Notifier, Observation, ObservedPort,
    PortObserver, SubdomainRecord, SubdomainSource, WatchConfig, WorldStateStore,
};
use tokio::sync::Notify;

/// Build a set of owned names
pub fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Observation of a host that is up with the given ports
pub fn up(ip: &str, ports: &[u16]) -> Observation {
    Observation::up(ip, ports.iter().map(|p| ObservedPort::new(*p)).collect())
}

/// Engine config with a short scan deadline
pub fn fast_engine_config(concurrency: usize) -> EngineConfig {
    EngineConfig {
        scan_concurrency: concurrency,
        scan_timeout_secs: 1,
    }
}

/// Monitor config for the given domains
pub fn watch_config(domains: &[&str]) -> WatchConfig {
    let mut config = WatchConfig::new().with_domains(domains.iter().copied());
    config.engine = fast_engine_config(4);
    config
}

/// A port observer that returns scripted observations
///
/// Unscripted hosts return an error. Hosts marked as hanging never return.
#[derive(Default)]
pub struct ScriptedObserver {
    script: Mutex<HashMap<String, Observation>>,
    hanging: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, host: &str, observation: Observation) {
        self.script
            .lock()
            .unwrap()
            .insert(host.to_string(), observation);
    }

    pub fn hang_on(&self, host: &str) {
        self.hanging.lock().unwrap().insert(host.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortObserver for ScriptedObserver {
    async fn scan(&self, host: &str) -> Result<Observation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let hang = self.hanging.lock().unwrap().contains(host);
        if hang {
            std::future::pending::<()>().await;
        }

        let result = self
            .script
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .ok_or_else(|| Error::observer(format!("no scripted observation for {}", host)));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn observer_name(&self) -> &'static str {
        "scripted"
    }
}

/// A store that fails upserts for selected subdomains
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryWorldStore,
    fail_upsert_for: Mutex<HashSet<String>>,
    fail_load: AtomicBool,
    upserts: AtomicUsize,
    loads: AtomicUsize,
    flushes: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upsert_for(&self, subdomain: &str) {
        self.fail_upsert_for
            .lock()
            .unwrap()
            .insert(subdomain.to_string());
    }

    pub fn heal(&self) {
        self.fail_upsert_for.lock().unwrap().clear();
        self.fail_load.store(false, Ordering::SeqCst);
    }

    pub fn fail_load(&self) {
        self.fail_load.store(true, Ordering::SeqCst);
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorldStateStore for FailingStore {
    async fn load_domain(&self, domain: &str) -> Result<Vec<SubdomainRecord>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(Error::store("injected load failure"));
        }
        self.inner.load_domain(domain).await
    }

    async fn get(&self, domain: &str, subdomain: &str) -> Result<Option<SubdomainRecord>> {
        self.inner.get(domain, subdomain).await
    }

    async fn upsert(&self, record: &SubdomainRecord) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .fail_upsert_for
            .lock()
            .unwrap()
            .contains(&record.subdomain);
        if fail {
            return Err(Error::store(format!("injected failure for {}", record.subdomain)));
        }
        self.inner.upsert(record).await
    }

    async fn domains(&self) -> Result<Vec<String>> {
        self.inner.domains().await
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A discovery source with fixed results per domain
#[derive(Default)]
pub struct StaticSource {
    results: HashMap<String, Vec<String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, domain: &str, found: &[&str]) -> Self {
        self.results.insert(
            domain.to_string(),
            found.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl SubdomainSource for StaticSource {
    async fn discover(&self, domain: &str) -> BTreeSet<String> {
        self.results
            .get(domain)
            .map(|found| found.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// A validator that blocks its first call until released
///
/// Lets a test act while the monitor is inside a domain.
#[derive(Default)]
pub struct GateValidator {
    entered: Notify,
    release: Notify,
    gated: AtomicBool,
}

impl GateValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the first call is parked at the gate
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl HostValidator for GateValidator {
    async fn filter_resolvable(&self, hostnames: BTreeSet<String>) -> Result<BTreeSet<String>> {
        if !self.gated.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(hostnames)
    }
}

/// A notifier that records every report it receives
#[derive(Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<Report>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &Report) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::notifier("injected notifier failure"));
        }
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "recording"
    }
}
