//! Monitor loop
//!
//! The Monitor drives passes over every configured domain:
//!
//! ```text
//! discover → validate → reconcile → summarize → dispatch
//! ```
//!
//! Domains are processed one after another. A failure in any step for one
//! domain is logged and the pass moves on to the next domain. Shutdown is
//! observed between domains and while sleeping between passes, never while a
//! domain is being reconciled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::aggregator::SourceAggregator;
use crate::changes::ChangeSet;
use crate::config::WatchConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::engine::ReconcileEngine;
use crate::error::Result;
use crate::summary::summarize;
use crate::traits::HostValidator;

/// Events emitted by the Monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A pass over all domains started
    PassStarted { domains: usize },

    /// A domain was reconciled
    DomainReconciled {
        domain: String,
        new_subdomains: usize,
        port_changes: usize,
        failed: usize,
    },

    /// Nothing changed, no notification sent
    NotificationSkipped { domain: String },

    /// Notifiers were called
    NotificationSent {
        domain: String,
        sent: usize,
        failed: usize,
    },

    /// A domain could not be processed
    DomainFailed { domain: String, error: String },

    /// A pass finished
    PassCompleted { domains: usize, failed_domains: usize },

    /// Monitor stopped
    Stopped { reason: String },
}

/// Totals for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub domains: usize,
    pub failed_domains: usize,
    pub new_subdomains: usize,
    pub port_changes: usize,
    /// False when shutdown interrupted the pass
    pub completed: bool,
}

/// Monitor driving discovery, reconciliation and notification
///
/// ## Lifecycle
///
/// 1. Create with [`Monitor::new()`]
/// 2. Start with [`Monitor::run()`] or [`Monitor::run_with_shutdown()`]
/// 3. Passes repeat every `interval_secs` (or once with `run_once`)
/// 4. On shutdown the store is flushed before returning
pub struct Monitor {
    domains: Vec<String>,
    aggregator: SourceAggregator,
    validator: Arc<dyn HostValidator>,
    engine: ReconcileEngine,
    dispatcher: Dispatcher,
    interval: Duration,
    run_once: bool,
    event_tx: mpsc::Sender<MonitorEvent>,
}

impl Monitor {
    /// Create a new monitor
    ///
    /// # Returns
    ///
    /// A tuple of (monitor, event_receiver) where event_receiver yields monitor events
    pub fn new(
        config: &WatchConfig,
        aggregator: SourceAggregator,
        validator: Arc<dyn HostValidator>,
        engine: ReconcileEngine,
        dispatcher: Dispatcher,
    ) -> Result<(Self, mpsc::Receiver<MonitorEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.monitor.event_channel_capacity);

        let monitor = Self {
            domains: config.domains.clone(),
            aggregator,
            validator,
            engine,
            dispatcher,
            interval: config.monitor.interval(),
            run_once: config.monitor.run_once,
            event_tx: tx,
        };

        Ok((monitor, rx))
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(());
            }
        });

        let result = self.run_with_shutdown(rx).await;
        watcher.abort();
        result
    }

    /// Run until `shutdown_rx` fires (or its sender is dropped)
    ///
    /// Used by the daemon, which owns signal handling, and by tests.
    pub async fn run_with_shutdown(&self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        let mut shutdown = Shutdown::new(shutdown_rx);

        let reason = loop {
            let summary = self.pass_internal(&mut shutdown).await;
            if !summary.completed {
                break "Shutdown signal".to_string();
            }

            if self.run_once {
                break "Single pass completed".to_string();
            }

            info!("Next pass in {}s", self.interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait() => {
                    break "Shutdown signal".to_string();
                }
            }
        };

        info!("Monitor stopping: {}", reason);
        let flushed = self.engine.store().flush().await;
        self.emit_event(MonitorEvent::Stopped { reason });

        match flushed {
            Ok(()) => {
                info!("State flushed, monitor stopped");
                Ok(())
            }
            Err(e) => {
                error!("Failed to flush state: {}", e);
                Err(e)
            }
        }
    }

    /// Run a single pass over every domain
    pub async fn run_pass(&self) -> PassSummary {
        self.pass_internal(&mut Shutdown::never()).await
    }

    /// Run discover → validate → reconcile → summarize → dispatch for one domain
    pub async fn process_domain(&self, domain: &str) -> Result<ChangeSet> {
        let candidates = self.aggregator.discover(domain).await;
        let resolvable = self.validator.filter_resolvable(candidates).await?;
        info!("{} resolvable subdomains for {}", resolvable.len(), domain);

        let changes = self.engine.reconcile(domain, &resolvable).await?;
        self.emit_event(MonitorEvent::DomainReconciled {
            domain: domain.to_string(),
            new_subdomains: changes.new_subdomains.len(),
            port_changes: changes.port_changes.len(),
            failed: changes.failed.len(),
        });

        let report = summarize(&changes);
        match self.dispatcher.dispatch(&report).await {
            DispatchOutcome::Skipped => {
                self.emit_event(MonitorEvent::NotificationSkipped {
                    domain: domain.to_string(),
                });
            }
            DispatchOutcome::Delivered { sent, failed } => {
                self.emit_event(MonitorEvent::NotificationSent {
                    domain: domain.to_string(),
                    sent,
                    failed,
                });
            }
        }

        Ok(changes)
    }

    async fn pass_internal(&self, shutdown: &mut Shutdown) -> PassSummary {
        self.emit_event(MonitorEvent::PassStarted {
            domains: self.domains.len(),
        });
        info!("Starting pass over {} domain(s)", self.domains.len());

        let mut summary = PassSummary::default();
        for domain in &self.domains {
            if shutdown.requested() {
                info!("Shutdown requested, stopping before {}", domain);
                return summary;
            }

            summary.domains += 1;
            match self.process_domain(domain).await {
                Ok(changes) => {
                    summary.new_subdomains += changes.new_subdomains.len();
                    summary.port_changes += changes.port_changes.len();
                }
                Err(e) => {
                    error!("Failed to process {}: {}", domain, e);
                    summary.failed_domains += 1;
                    self.emit_event(MonitorEvent::DomainFailed {
                        domain: domain.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        summary.completed = true;
        info!(
            "Pass complete: {} domain(s), {} failed, {} new subdomain(s), {} port change(s)",
            summary.domains, summary.failed_domains, summary.new_subdomains, summary.port_changes
        );
        self.emit_event(MonitorEvent::PassCompleted {
            domains: summary.domains,
            failed_domains: summary.failed_domains,
        });
        summary
    }

    fn emit_event(&self, event: MonitorEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// Shutdown latch over an optional oneshot receiver
struct Shutdown {
    rx: Option<oneshot::Receiver<()>>,
    triggered: bool,
}

impl Shutdown {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Self {
            rx: Some(rx),
            triggered: false,
        }
    }

    fn never() -> Self {
        Self {
            rx: None,
            triggered: false,
        }
    }

    /// Non-blocking check; a dropped sender counts as shutdown
    fn requested(&mut self) -> bool {
        if self.triggered {
            return true;
        }
        if let Some(rx) = self.rx.as_mut() {
            match rx.try_recv() {
                Ok(()) | Err(oneshot::error::TryRecvError::Closed) => {
                    self.triggered = true;
                    self.rx = None;
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
        }
        self.triggered
    }

    /// Resolve once shutdown is requested; pending forever without a receiver
    async fn wait(&mut self) {
        if self.triggered {
            return;
        }
        match self.rx.as_mut() {
            Some(rx) => {
                let _ = rx.await;
                self.triggered = true;
                self.rx = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_event_clone_eq() {
        let event = MonitorEvent::DomainReconciled {
            domain: "example.com".to_string(),
            new_subdomains: 1,
            port_changes: 0,
            failed: 0,
        };
        assert_eq!(event.clone(), event);
    }

    #[tokio::test]
    async fn test_shutdown_latch() {
        let (tx, rx) = oneshot::channel();
        let mut shutdown = Shutdown::new(rx);
        assert!(!shutdown.requested());

        tx.send(()).unwrap();
        assert!(shutdown.requested());
        assert!(shutdown.requested());
        shutdown.wait().await;
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_shutdown() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut shutdown = Shutdown::new(rx);
        drop(tx);
        assert!(shutdown.requested());
    }

    #[tokio::test]
    async fn test_never_is_not_requested() {
        let mut shutdown = Shutdown::never();
        assert!(!shutdown.requested());
        let waited =
            tokio::time::timeout(Duration::from_millis(20), shutdown.wait()).await;
        assert!(waited.is_err());
    }
}
