//! Contract Test: Monitor Passes & Shutdown
//!
//! Constraints verified:
//! - A pass runs discover → validate → reconcile → summarize → dispatch
//! - Unchanged passes send nothing (explicit skip)
//! - One failing domain does not stop the pass
//! - Shutdown is observed between domains, never mid-domain
//! - Shutdown during the interval sleep returns promptly
//! - The store is flushed before the monitor returns

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use subwatch_core::{
    Dispatcher, Monitor, MonitorEvent, ReconcileEngine, SourceAggregator, WorldStateStore,
    traits::validator::AcceptAllValidator,
};
use tokio::sync::mpsc;

fn drain(rx: &mut mpsc::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn run_once_reports_then_skips() {
    let source = StaticSource::new().with("ex.com", &["a.ex.com", "*.b.ex.com", "elsewhere.org"]);
    let observer = Arc::new(ScriptedObserver::new());
    observer.set("a.ex.com", up("10.0.0.1", &[443]));
    observer.set("b.ex.com", up("10.0.0.2", &[80]));
    let store = Arc::new(FailingStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let mut config = watch_config(&["ex.com"]);
    config.monitor.run_once = true;

    let engine = ReconcileEngine::new(observer.clone(), store.clone(), config.engine.clone()).unwrap();
    let (monitor, mut events) = Monitor::new(
        &config,
        SourceAggregator::new().with_source(Arc::new(source)),
        Arc::new(AcceptAllValidator),
        engine,
        Dispatcher::new().with_notifier(notifier.clone()),
    )
    .unwrap();

    let first = monitor.run_pass().await;
    assert!(first.completed);
    assert_eq!(first.new_subdomains, 2);

    let second = monitor.run_pass().await;
    assert_eq!(second.new_subdomains, 0);
    assert_eq!(second.port_changes, 0);

    let reports = notifier.reports();
    assert_eq!(reports.len(), 1, "unchanged pass must not notify");
    assert_eq!(reports[0].new_subdomains.len(), 2);

    let events = drain(&mut events);
    assert!(events.contains(&MonitorEvent::NotificationSkipped {
        domain: "ex.com".to_string()
    }));
    assert!(events.contains(&MonitorEvent::NotificationSent {
        domain: "ex.com".to_string(),
        sent: 1,
        failed: 0
    }));

    let (_tx, rx) = tokio::sync::oneshot::channel();
    monitor.run_with_shutdown(rx).await.unwrap();
    assert_eq!(store.flushes(), 1);
}

#[tokio::test]
async fn failing_domain_does_not_stop_pass() {
    let source = StaticSource::new()
        .with("bad.com", &["x.bad.com"])
        .with("good.com", &["y.good.com"]);
    let observer = Arc::new(ScriptedObserver::new());
    observer.set("y.good.com", up("10.0.0.1", &[22]));
    let store = Arc::new(FailingStore::new());

    let config = watch_config(&["bad.com", "good.com"]);
    let engine = ReconcileEngine::new(observer.clone(), store.clone(), config.engine.clone()).unwrap();
    let (monitor, mut events) = Monitor::new(
        &config,
        SourceAggregator::new().with_source(Arc::new(source)),
        Arc::new(AcceptAllValidator),
        engine,
        Dispatcher::new(),
    )
    .unwrap();

    // Loads fail until healed
    store.fail_load();
    let bad = monitor.process_domain("bad.com").await;
    assert!(bad.is_err());
    store.heal();

    let summary = monitor.run_pass().await;
    assert_eq!(summary.domains, 2);
    assert_eq!(summary.failed_domains, 0);
    assert!(store.get("good.com", "y.good.com").await.unwrap().is_some());

    store.fail_load();
    let summary = monitor.run_pass().await;
    assert_eq!(summary.domains, 2);
    assert_eq!(summary.failed_domains, 2);

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        MonitorEvent::DomainFailed { domain, .. } if domain == "good.com"
    )));
}

#[tokio::test]
async fn shutdown_between_domains_finishes_current_domain() {
    let source = StaticSource::new()
        .with("one.com", &["a.one.com"])
        .with("two.com", &["a.two.com"]);
    let observer = Arc::new(ScriptedObserver::new());
    observer.set("a.one.com", up("10.0.0.1", &[80]));
    observer.set("a.two.com", up("10.0.0.2", &[80]));
    let store = Arc::new(FailingStore::new());
    let gate = Arc::new(GateValidator::new());

    let config = watch_config(&["one.com", "two.com"]);
    let engine = ReconcileEngine::new(observer.clone(), store.clone(), config.engine.clone()).unwrap();
    let (monitor, mut events) = Monitor::new(
        &config,
        SourceAggregator::new().with_source(Arc::new(source)),
        gate.clone(),
        engine,
        Dispatcher::new(),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { monitor.run_with_shutdown(shutdown_rx).await });

    // The monitor is now inside one.com
    gate.wait_entered().await;
    shutdown_tx.send(()).unwrap();
    gate.release();

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "monitor should stop within 5 seconds");
    result.unwrap().unwrap().unwrap();

    assert!(store.get("one.com", "a.one.com").await.unwrap().is_some());
    assert!(store.get("two.com", "a.two.com").await.unwrap().is_none());
    assert_eq!(observer.calls(), 1);
    assert_eq!(store.flushes(), 1);

    let events = drain(&mut events);
    assert!(matches!(events.last(), Some(MonitorEvent::Stopped { .. })));
    assert!(!events.iter().any(|e| matches!(e, MonitorEvent::PassCompleted { .. })));
}

#[tokio::test]
async fn shutdown_during_interval_sleep() {
    let source = StaticSource::new().with("ex.com", &["a.ex.com"]);
    let observer = Arc::new(ScriptedObserver::new());
    observer.set("a.ex.com", up("10.0.0.1", &[80]));
    let store = Arc::new(FailingStore::new());

    let mut config = watch_config(&["ex.com"]);
    config.monitor.interval_secs = 3600;
    let engine = ReconcileEngine::new(observer.clone(), store.clone(), config.engine.clone()).unwrap();
    let (monitor, mut events) = Monitor::new(
        &config,
        SourceAggregator::new().with_source(Arc::new(source)),
        Arc::new(AcceptAllValidator),
        engine,
        Dispatcher::new(),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { monitor.run_with_shutdown(shutdown_rx).await });

    // Wait for the first pass to finish
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(MonitorEvent::PassCompleted { .. })) => break,
            Ok(Some(_)) => continue,
            other => panic!("monitor did not complete a pass: {:?}", other),
        }
    }

    shutdown_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "monitor should leave the interval sleep on shutdown");
    result.unwrap().unwrap().unwrap();

    assert_eq!(observer.calls(), 1);
    assert_eq!(store.flushes(), 1);
}
