// # Port Observer Trait
//
// Defines the interface for scanning one host for open ports and services.
//
// ## Implementations
//
// - nmap with HTTP-probe fallback: `subwatch-nmap` crate
//
// ## Usage
//
// ```rust,ignore
// use subwatch_core::PortObserver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let observer = /* PortObserver implementation */;
//     let observation = observer.scan("www.example.com").await?;
//     println!("{:?} {:?}", observation.reachability, observation.open_ports());
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::Observation;

/// Trait for port observer implementations
///
/// # Failure Semantics
///
/// A scan-tool that is missing or crashes is reported as an unreachable
/// observation (`Observation::unreachable`), not as an error. `Err` is
/// reserved for failures the observer cannot classify; the engine degrades
/// those, and timeouts, to `Observation::unknown()` for that host only.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Spawning the scan tool as a child process
/// - ✅ Network probes against the scanned host
///
/// ## Forbidden Capabilities
/// - ❌ Enforcing its own overall deadline (owned by `ReconcileEngine`)
/// - ❌ Accessing the state store
/// - ❌ Deciding whether a result is a change
///
/// Calls run concurrently, bounded by the engine's `scan_concurrency`.
#[async_trait]
pub trait PortObserver: Send + Sync {
    /// Scan `host`
    ///
    /// # Returns
    ///
    /// - `Ok(Observation)`: reachability, address and open ports
    /// - `Err(Error)`: unclassified failure (engine degrades it to unknown)
    async fn scan(&self, host: &str) -> Result<Observation, crate::Error>;

    /// Short name used in logs
    fn observer_name(&self) -> &'static str;
}
