use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;

use subwatch_core::{Result, SubdomainSource};

use crate::{fetch_text, http_client, settle, trim_base};

const DEFAULT_BASE_URL: &str = "https://crt.sh";

/// crt.sh certificate-transparency source
pub struct CrtShSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    name_value: String,
}

impl CrtShSource {
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
        let url = format!("{}/", self.base_url);
        let pattern = format!("%.{}", domain);
        let request = self
            .client
            .get(&url)
            .query(&[("q", pattern.as_str()), ("output", "json")]);
        let body = fetch_text(self.name(), request).await?;
        parse_crtsh(&body)
    }
}

impl Default for CrtShSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Split each entry's `name_value` on newlines
///
/// An empty body means no certificates matched.
pub fn parse_crtsh(body: &str) -> Result<BTreeSet<String>> {
    if body.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    let entries: Vec<Entry> = serde_json::from_str(body)?;
    Ok(entries
        .iter()
        .flat_map(|entry| entry.name_value.lines())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

#[async_trait]
impl SubdomainSource for CrtShSource {
    async fn discover(&self, domain: &str) -> BTreeSet<String> {
        settle(self.name(), domain, self.fetch(domain).await)
    }

    fn name(&self) -> &'static str {
        "crtsh"
    }
}
