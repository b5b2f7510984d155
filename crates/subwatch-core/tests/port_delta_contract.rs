//! Contract Test: Port Deltas
//!
//! Constraints verified:
//! - opened = observed − stored, closed = stored − observed
//! - Ports compare as sets regardless of report order
//! - An unreachable host has every previously open port closed
//! - A failed or timed-out scan behaves like unreachable, recorded as unknown
//! - Services always match open ports after an update
//! - Ports without metadata get an `unknown` service entry

mod common;

use common::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use subwatch_core::{
    EngineConfig, MemoryWorldStore, Observation, ObservedPort, Reachability, ReconcileEngine,
    WorldStateStore,
};

async fn seeded(ports: &[u16]) -> (Arc<ScriptedObserver>, Arc<MemoryWorldStore>, ReconcileEngine) {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set("a.ex.com", up("10.0.0.1", ports));
    let store = Arc::new(MemoryWorldStore::new());
    let engine =
        ReconcileEngine::new(observer.clone(), store.clone(), EngineConfig::default()).unwrap();
    engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();
    (observer, store, engine)
}

#[tokio::test]
async fn opened_and_closed_ports_are_reported() {
    let (observer, store, engine) = seeded(&[80, 443]).await;
    observer.set("a.ex.com", up("10.0.0.2", &[8080, 443]));

    let changes = engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();

    assert!(changes.new_subdomains.is_empty());
    assert_eq!(changes.port_changes.len(), 1);
    let change = &changes.port_changes[0];
    assert_eq!(change.newly_opened, BTreeSet::from([8080]));
    assert_eq!(change.newly_closed, BTreeSet::from([80]));
    assert_eq!(change.new_ports, BTreeSet::from([443, 8080]));
    assert_eq!(change.old_ip, "10.0.0.1");
    assert_eq!(change.new_ip, "10.0.0.2");

    let stored = store.get("ex.com", "a.ex.com").await.unwrap().unwrap();
    assert_eq!(stored.open_ports, BTreeSet::from([443, 8080]));
    assert!(stored.services_consistent());
    assert!(!stored.services.contains_key(&80));
}

#[tokio::test]
async fn reordered_ports_are_not_a_change() {
    let (observer, _store, engine) = seeded(&[443, 80, 22]).await;
    observer.set("a.ex.com", up("10.0.0.1", &[22, 80, 443, 80]));

    let changes = engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();

    assert!(changes.is_empty());
}

#[tokio::test]
async fn unreachable_closes_every_port() {
    let (observer, store, engine) = seeded(&[22, 80]).await;
    observer.set("a.ex.com", Observation::unreachable(""));

    let changes = engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();

    let change = &changes.port_changes[0];
    assert_eq!(change.newly_closed, BTreeSet::from([22, 80]));
    assert!(change.newly_opened.is_empty());
    assert!(change.new_ports.is_empty());

    let stored = store.get("ex.com", "a.ex.com").await.unwrap().unwrap();
    assert_eq!(stored.reachable, Reachability::Down);
    assert!(stored.services.is_empty());
}

#[tokio::test]
async fn failed_scan_closes_ports_as_unknown() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set("a.ex.com", up("10.0.0.1", &[443]));
    let store = Arc::new(MemoryWorldStore::new());
    let engine =
        ReconcileEngine::new(observer.clone(), store.clone(), EngineConfig::default()).unwrap();
    engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();

    // No script and not hanging: the observer returns an error
    let failing = Arc::new(ScriptedObserver::new());
    let engine =
        ReconcileEngine::new(failing.clone(), store.clone(), EngineConfig::default()).unwrap();
    let changes = engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();

    assert_eq!(changes.port_changes[0].newly_closed, BTreeSet::from([443]));
    let stored = store.get("ex.com", "a.ex.com").await.unwrap().unwrap();
    assert_eq!(stored.reachable, Reachability::Unknown);
    assert_eq!(stored.ip_address, "10.0.0.1", "address kept when the scan learned none");
}

#[tokio::test]
async fn timed_out_scan_degrades_to_unknown() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.hang_on("slow.ex.com");
    observer.set("fast.ex.com", up("10.0.0.1", &[80]));
    let store = Arc::new(MemoryWorldStore::new());
    let engine =
        ReconcileEngine::new(observer.clone(), store.clone(), fast_engine_config(4)).unwrap();

    let started = std::time::Instant::now();
    let changes = engine
        .reconcile("ex.com", &names(&["slow.ex.com", "fast.ex.com"]))
        .await
        .unwrap();

    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert_eq!(changes.new_subdomains.len(), 2);

    let slow = store.get("ex.com", "slow.ex.com").await.unwrap().unwrap();
    assert_eq!(slow.reachable, Reachability::Unknown);
    assert!(slow.open_ports.is_empty());

    let fast = store.get("ex.com", "fast.ex.com").await.unwrap().unwrap();
    assert_eq!(fast.reachable, Reachability::Up);
}

#[tokio::test]
async fn ports_without_metadata_are_unknown_services() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set(
        "a.ex.com",
        Observation::up(
            "10.0.0.1",
            vec![
                ObservedPort::new(22).with_service("ssh").with_product("OpenSSH").with_version("9.6"),
                ObservedPort::new(9000),
            ],
        ),
    );
    let store = Arc::new(MemoryWorldStore::new());
    let engine =
        ReconcileEngine::new(observer.clone(), store.clone(), EngineConfig::default()).unwrap();

    let changes = engine.reconcile("ex.com", &names(&["a.ex.com"])).await.unwrap();

    let state = &changes.new_subdomains[0].state;
    assert_eq!(state.services[&22].product, "OpenSSH");
    assert!(state.services[&9000].is_unknown());
    assert!(state.services_consistent());
}
