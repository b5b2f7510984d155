// # Subdomain Source Trait
//
// Defines the interface for discovering candidate hostnames of a root domain.
//
// ## Implementations
//
// - HackerTarget, RapidDNS, CertSpotter, crt.sh: `subwatch-sources` crate
// - Future: passive DNS feeds, brute-force wordlists
//
// ## Usage
//
// ```rust,ignore
// use subwatch_core::SubdomainSource;
//
// #[tokio::main]
// async fn main() {
//     let source = /* SubdomainSource implementation */;
//     let hosts = source.discover("example.com").await;
//     println!("{} found {} hosts", source.name(), hosts.len());
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeSet;

/// Trait for discovery source implementations
///
/// # Failure Semantics
///
/// `discover()` is infallible by signature. A source that cannot reach its
/// upstream (timeout, HTTP error, malformed body) logs a warning and returns
/// an empty set, so one outage never blocks the others.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ HTTP calls to the source's own endpoint
/// - ✅ Parsing the upstream response format
///
/// ## Forbidden Capabilities
/// - ❌ Retrying or backing off (one request per call)
/// - ❌ Accessing the state store
/// - ❌ Filtering by DNS resolution (owned by `HostValidator`)
///
/// Implementations may return names outside the root domain; the
/// [`SourceAggregator`](crate::aggregator::SourceAggregator) filters them.
#[async_trait]
pub trait SubdomainSource: Send + Sync {
    /// Discover hostnames under `domain`
    ///
    /// # Returns
    ///
    /// Raw hostnames as reported upstream (case and trailing dots untouched).
    /// Empty on any failure.
    async fn discover(&self, domain: &str) -> BTreeSet<String>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}
