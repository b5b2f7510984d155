use async_trait::async_trait;
use std::collections::BTreeSet;

use subwatch_core::{Result, SubdomainSource};

use crate::{fetch_text, http_client, settle, trim_base};

const DEFAULT_BASE_URL: &str = "https://api.hackertarget.com";

/// HackerTarget `hostsearch` source
pub struct HackerTargetSource {
    client: reqwest::Client,
    base_url: String,
}

impl HackerTargetSource {
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
        let url = format!("{}/hostsearch/", self.base_url);
        let request = self.client.get(&url).query(&[("q", domain)]);
        let body = fetch_text(self.name(), request).await?;
        Ok(parse_hostsearch(&body))
    }
}

impl Default for HackerTargetSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `host,ip` lines
///
/// Lines without a comma are skipped; the API answers quota and lookup
/// errors with a single plain-text line ("API count exceeded", "error ...").
pub fn parse_hostsearch(body: &str) -> BTreeSet<String> {
    body.lines()
        .filter_map(|line| line.split_once(','))
        .map(|(host, _ip)| host.trim())
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SubdomainSource for HackerTargetSource {
    async fn discover(&self, domain: &str) -> BTreeSet<String> {
        settle(self.name(), domain, self.fetch(domain).await)
    }

    fn name(&self) -> &'static str {
        "hackertarget"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_hostsearch() {
        let body = "www.example.com,93.184.216.34\nmail.example.com,10.0.0.1\n\n";
        let hosts = parse_hostsearch(body);
        assert_eq!(hosts.len(), 2);
        assert!(hosts.contains("www.example.com"));
        assert!(hosts.contains("mail.example.com"));
    }

    #[test]
    fn test_parse_error_line() {
        assert!(parse_hostsearch("API count exceeded - Increase Quota with Membership").is_empty());
        assert!(parse_hostsearch("error check your search parameter").is_empty());
    }

    #[tokio::test]
    async fn test_discover() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hostsearch/"))
            .and(query_param("q", "example.com"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("a.example.com,1.1.1.1\nb.example.com,2.2.2.2"),
            )
            .mount(&server)
            .await;

        let source = HackerTargetSource::with_base_url(server.uri());
        let hosts = source.discover("example.com").await;

        assert_eq!(hosts.len(), 2);
        assert!(hosts.contains("a.example.com"));
    }

    #[tokio::test]
    async fn test_http_error_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let source = HackerTargetSource::with_base_url(server.uri());
        assert!(source.discover("example.com").await.is_empty());
    }
}
