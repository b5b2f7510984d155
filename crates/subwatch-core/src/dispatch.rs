//! Notification dispatch
//!
//! Fans a [`Report`] out to every registered [`Notifier`]. Empty reports are
//! never sent.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::summary::Report;
use crate::traits::Notifier;

/// Result of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing to report; no notifier was called
    Skipped,
    /// Notifiers were called
    Delivered { sent: usize, failed: usize },
}

/// Delivers reports to notifiers
#[derive(Default, Clone)]
pub struct Dispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn add_notifier(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// Send `report` to every notifier
    ///
    /// Notifier errors are logged and counted, never returned.
    pub async fn dispatch(&self, report: &Report) -> DispatchOutcome {
        if report.is_empty() {
            debug!("No changes for {}, skipping notification", report.domain);
            return DispatchOutcome::Skipped;
        }

        let mut sent = 0;
        let mut failed = 0;
        for notifier in &self.notifiers {
            match notifier.notify(report).await {
                Ok(()) => {
                    info!(
                        "Sent {} report via {}",
                        report.domain,
                        notifier.notifier_name()
                    );
                    sent += 1;
                }
                Err(e) => {
                    warn!(
                        "Notifier {} failed for {}: {}",
                        notifier.notifier_name(),
                        report.domain,
                        e
                    );
                    failed += 1;
                }
            }
        }

        DispatchOutcome::Delivered { sent, failed }
    }
}
