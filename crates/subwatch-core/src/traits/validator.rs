// # Host Validator Trait
//
// Filters candidate hostnames down to the ones that resolve in DNS.
//
// ## Implementations
//
// - A-record resolver: `subwatch-dns` crate

use async_trait::async_trait;
use std::collections::BTreeSet;

/// Trait for DNS validation
///
/// Resolution failures of individual names are not errors: those names are
/// simply absent from the output. An `Err` means the validator itself could
/// not run (for example the resolver could not be configured), and the
/// caller decides whether to skip the domain.
#[async_trait]
pub trait HostValidator: Send + Sync {
    /// Return the subset of `hostnames` that resolve
    async fn filter_resolvable(
        &self,
        hostnames: BTreeSet<String>,
    ) -> Result<BTreeSet<String>, crate::Error>;
}

/// Validator that accepts every hostname
///
/// Used when DNS validation is disabled, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

#[async_trait]
impl HostValidator for AcceptAllValidator {
    async fn filter_resolvable(
        &self,
        hostnames: BTreeSet<String>,
    ) -> Result<BTreeSet<String>, crate::Error> {
        Ok(hostnames)
    }
}
