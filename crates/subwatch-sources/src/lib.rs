// # Passive Discovery Sources
//
// This crate provides SubdomainSource implementations backed by public
// passive-DNS and certificate-transparency APIs:
//
// - `HackerTargetSource`: `hostsearch` CSV (`host,ip` lines)
// - `RapidDnsSource`: plain-text listing, one host per line
// - `CertSpotterSource`: issuance JSON with `dns_names` arrays
// - `CrtShSource`: crt.sh JSON with newline-separated `name_value`
//
// ### Trust Level: Untrusted (Discovery Source)
//
// **Allowed Capabilities**:
// - ✅ One HTTP request per `discover()` call, to the source's own endpoint
// - ✅ Parsing the upstream format
//
// **Forbidden Capabilities**:
// - ❌ Retry logic (a failed source simply contributes nothing this pass)
// - ❌ Filtering by root domain (owned by `SourceAggregator`)
// - ❌ Background tasks
//
// Every source takes a base URL so tests can point it at a local server.

mod certspotter;
mod crtsh;
mod hackertarget;
mod rapiddns;

pub use certspotter::{CertSpotterSource, parse_issuances};
pub use crtsh::{CrtShSource, parse_crtsh};
pub use hackertarget::{HackerTargetSource, parse_hostsearch};
pub use rapiddns::{RapidDnsSource, parse_plain};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use subwatch_core::{Error, Result, SourceAggregator};

/// HTTP timeout for every discovery request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("subwatch/", env!("CARGO_PKG_VERSION"));

/// Register every built-in source with an aggregator
pub fn register_all(aggregator: &mut SourceAggregator) {
    aggregator.add_source(Arc::new(HackerTargetSource::new()));
    aggregator.add_source(Arc::new(RapidDnsSource::new()));
    aggregator.add_source(Arc::new(CertSpotterSource::new()));
    aggregator.add_source(Arc::new(CrtShSource::new()));
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

fn trim_base(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}

/// Send a request and return its body, mapping failures to `Error::Source`
async fn fetch_text(source: &str, request: reqwest::RequestBuilder) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::source(format!("{}: request failed: {}", source, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::source(format!("{}: HTTP error: {}", source, status)));
    }

    response
        .text()
        .await
        .map_err(|e| Error::source(format!("{}: failed to read response: {}", source, e)))
}

/// Log the outcome of one discovery call and drop errors to an empty set
fn settle(source: &str, domain: &str, fetched: Result<BTreeSet<String>>) -> BTreeSet<String> {
    match fetched {
        Ok(hosts) => {
            debug!(source = source, domain = %domain, count = hosts.len(), "Fetched hosts");
            hosts
        }
        Err(e) => {
            warn!(source = source, domain = %domain, error = %e, "Discovery failed");
            BTreeSet::new()
        }
    }
}
