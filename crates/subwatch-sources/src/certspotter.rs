use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;

use subwatch_core::{Result, SubdomainSource};

use crate::{fetch_text, http_client, settle, trim_base};

const DEFAULT_BASE_URL: &str = "https://api.certspotter.com";

/// Cert Spotter issuance source
pub struct CertSpotterSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Issuance {
    #[serde(default)]
    dns_names: Vec<String>,
}

impl CertSpotterSource {
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
        let url = format!("{}/v1/issuances", self.base_url);
        let request = self.client.get(&url).query(&[
            ("domain", domain),
            ("include_subdomains", "true"),
            ("expand", "dns_names"),
        ]);
        let body = fetch_text(self.name(), request).await?;
        parse_issuances(&body)
    }
}

impl Default for CertSpotterSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect every `dns_names` entry of an issuance array
pub fn parse_issuances(body: &str) -> Result<BTreeSet<String>> {
    let issuances: Vec<Issuance> = serde_json::from_str(body)?;
    Ok(issuances
        .into_iter()
        .flat_map(|issuance| issuance.dns_names)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}

#[async_trait]
impl SubdomainSource for CertSpotterSource {
    async fn discover(&self, domain: &str) -> BTreeSet<String> {
        settle(self.name(), domain, self.fetch(domain).await)
    }

    fn name(&self) -> &'static str {
        "certspotter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = r#"[
        {"id": "1", "dns_names": ["example.com", "*.example.com", "www.example.com"]},
        {"id": "2", "dns_names": ["api.example.com", "www.example.com"]},
        {"id": "3"}
    ]"#;

    #[test]
    fn test_parse_issuances() {
        let hosts = parse_issuances(BODY).unwrap();
        assert_eq!(hosts.len(), 4);
        assert!(hosts.contains("*.example.com"));
        assert!(hosts.contains("api.example.com"));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_issuances("{\"code\": \"rate_limited\"}").is_err());
    }

    #[tokio::test]
    async fn test_discover() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/issuances"))
            .and(query_param("domain", "example.com"))
            .and(query_param("include_subdomains", "true"))
            .and(query_param("expand", "dns_names"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let source = CertSpotterSource::with_base_url(server.uri());
        let hosts = source.discover("example.com").await;

        assert_eq!(hosts.len(), 4);
    }

    #[tokio::test]
    async fn test_malformed_body_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let source = CertSpotterSource::with_base_url(server.uri());
        assert!(source.discover("example.com").await.is_empty());
    }
}
