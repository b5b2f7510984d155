// # Notifier Trait
//
// Delivers a rendered change report to a chat channel, mailbox, etc.
//
// ## Implementations
//
// - Microsoft Teams incoming webhook: `subwatch-notify-teams` crate

use async_trait::async_trait;

use crate::summary::Report;

/// Trait for notifier implementations
///
/// Notifiers are fire-and-forget from the monitor's point of view: the
/// [`Dispatcher`](crate::dispatch::Dispatcher) logs a returned error and moves
/// on. Notifiers are never called with an empty report.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `report`
    async fn notify(&self, report: &Report) -> Result<(), crate::Error>;

    /// Short name used in logs
    fn notifier_name(&self) -> &'static str;
}
