use async_trait::async_trait;
use std::collections::BTreeSet;

use subwatch_core::{Result, SubdomainSource};

use crate::{fetch_text, http_client, settle, trim_base};

const DEFAULT_BASE_URL: &str = "https://rapiddns.io";

/// RapidDNS plain-text source
pub struct RapidDnsSource {
    client: reqwest::Client,
    base_url: String,
}

impl RapidDnsSource {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: trim_base(base_url),
        }
    }

    async fn fetch(&self, domain: &str) -> Result<BTreeSet<String>> {
        let url = format!("{}/subdomain/{}", self.base_url, domain);
        let request = self.client.get(&url).query(&[("plain", "1")]);
        let body = fetch_text(self.name(), request).await?;
        Ok(parse_plain(&body))
    }
}

impl Default for RapidDnsSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one hostname per line
///
/// Any line containing whitespace or markup is ignored, so an HTML error
/// page produces nothing rather than garbage.
pub fn parse_plain(body: &str) -> BTreeSet<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.contains(|c: char| c.is_whitespace() || c == '<' || c == '>'))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SubdomainSource for RapidDnsSource {
    async fn discover(&self, domain: &str) -> BTreeSet<String> {
        settle(self.name(), domain, self.fetch(domain).await)
    }

    fn name(&self) -> &'static str {
        "rapiddns"
    }
}
