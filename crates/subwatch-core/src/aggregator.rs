//! Source aggregation
//!
//! Runs every registered [`SubdomainSource`] for a domain concurrently and
//! merges their results by set union.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::hostname::clean_discovered;
use crate::traits::SubdomainSource;

/// Merges hostnames from multiple discovery sources
#[derive(Default, Clone)]
pub struct SourceAggregator {
    sources: Vec<Arc<dyn SubdomainSource>>,
}

impl SourceAggregator {
    /// Create an aggregator with no sources
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source
    pub fn with_source(mut self, source: Arc<dyn SubdomainSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Register a source in place
    pub fn add_source(&mut self, source: Arc<dyn SubdomainSource>) {
        self.sources.push(source);
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Names of the registered sources, in registration order
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Discover hostnames for `domain` from every source.
    ///
    /// Names are lowercased, wildcard prefixes and trailing dots removed, and
    /// anything outside `domain` dropped. A source that panics contributes
    /// nothing.
    pub async fn discover(&self, domain: &str) -> BTreeSet<String> {
        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let domain = domain.to_string();
            tasks.spawn(async move {
                let found = source.discover(&domain).await;
                (source.name(), found)
            });
        }

        let mut merged = BTreeSet::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, found)) => {
                    let before = merged.len();
                    merged.extend(found.iter().filter_map(|raw| clean_discovered(raw, domain)));
                    debug!(
                        "Source {} returned {} names for {} ({} new after merge)",
                        name,
                        found.len(),
                        domain,
                        merged.len() - before
                    );
                }
                Err(e) => {
                    warn!("Discovery source task failed for {}: {}", domain, e);
                }
            }
        }

        info!(
            "Discovered {} candidate subdomains for {} from {} sources",
            merged.len(),
            domain,
            self.sources.len()
        );
        merged
    }
}
