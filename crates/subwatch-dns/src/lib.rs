// # DNS Validator
//
// This crate provides a HostValidator that keeps only the candidate
// hostnames with at least one A record.
//
// ## Failure Semantics
//
// Every per-name failure (NXDOMAIN, SERVFAIL, timeout) is treated as
// "does not resolve" and the name is dropped. `filter_resolvable` itself
// never returns `Err`.
//
// ## Concurrency
//
// Lookups run in a JoinSet bounded by a semaphore. Each lookup is wrapped in
// its own timeout on top of the resolver's per-query timeout.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};

use subwatch_core::{Error, HostValidator, Result};

/// Per-name lookup timeout
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of lookups in flight
pub const DEFAULT_CONCURRENCY: usize = 16;

/// A-record validator backed by trust-dns
pub struct DnsValidator {
    resolver: TokioAsyncResolver,
    concurrency: usize,
    timeout: Duration,
}

impl DnsValidator {
    /// Create a validator using the system resolver configuration
    ///
    /// Falls back to the library's default upstreams when
    /// `/etc/resolv.conf` cannot be read.
    pub fn new() -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(error = %e, "System resolver config unavailable, using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), Self::default_opts())
            }
        };
        Self::with_resolver(resolver)
    }

    /// Create a validator around an existing resolver
    pub fn with_resolver(resolver: TokioAsyncResolver) -> Self {
        Self {
            resolver,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: LOOKUP_TIMEOUT,
        }
    }

    /// Set the number of concurrent lookups
    pub fn with_concurrency(mut self, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::config("DNS lookup concurrency must be at least 1"));
        }
        self.concurrency = concurrency;
        Ok(self)
    }

    /// Set the per-name timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn default_opts() -> ResolverOpts {
        let mut opts = ResolverOpts::default();
        opts.timeout = LOOKUP_TIMEOUT;
        opts.attempts = 1;
        opts
    }

    async fn resolves(resolver: &TokioAsyncResolver, host: &str, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, resolver.ipv4_lookup(host)).await {
            Ok(Ok(lookup)) => lookup.iter().next().is_some(),
            Ok(Err(e)) => {
                debug!(host = %host, error = %e, "Lookup failed");
                false
            }
            Err(_) => {
                debug!(host = %host, "Lookup timed out");
                false
            }
        }
    }
}

impl Default for DnsValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostValidator for DnsValidator {
    async fn filter_resolvable(&self, hostnames: BTreeSet<String>) -> Result<BTreeSet<String>> {
        let total = hostnames.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for host in hostnames {
            let semaphore = semaphore.clone();
            let resolver = self.resolver.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Self::resolves(&resolver, &host, timeout).await.then_some(host)
            });
        }

        let mut resolved = BTreeSet::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(host)) => {
                    resolved.insert(host);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Lookup task failed"),
            }
        }

        info!(total = total, resolved = resolved.len(), "DNS validation complete");
        Ok(resolved)
    }
}
