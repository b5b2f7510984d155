// # Microsoft Teams Notifier
//
// This crate posts subwatch reports to a Teams incoming webhook as legacy
// `MessageCard` payloads.
//
// ## Cards
//
// A report can produce up to two cards, one per change kind:
//
// - "New Subdomains Detected": a bullet list of the new names
// - "Subdomains & Ports Report": the port-change table as markdown
//
// ### Trust Level: Untrusted (Notifier)
//
// **Allowed Capabilities**:
// - ✅ HTTP POST to the configured webhook only
//
// **Forbidden Capabilities**:
// - ❌ Retry logic (a failed card is reported to the dispatcher and dropped)
// - ❌ Deciding whether a report is worth sending (owned by `Dispatcher`)
//
// ## Security Requirements
//
// The webhook URL embeds its credential. It never appears in logs or in
// the Debug output.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

use subwatch_core::{Error, Notifier, Report, Result};

/// HTTP timeout for each webhook POST
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const THEME_COLOR: &str = "0076D7";
const CARD_CONTEXT: &str = "http://schema.org/extensions";
const ACTIVITY_IMAGE: &str = "https://cdn-icons-png.flaticon.com/512/2039/2039001.png";

pub const NEW_SUBDOMAINS_TITLE: &str = "New Subdomains Detected";
pub const PORT_REPORT_TITLE: &str = "Subdomains & Ports Report";

/// Teams incoming-webhook notifier
pub struct TeamsNotifier {
    /// ⚠️ NEVER log this value
    webhook_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TeamsNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamsNotifier")
            .field("webhook_url", &"<REDACTED>")
            .finish()
    }
}

impl TeamsNotifier {
    /// Create a notifier for `webhook_url`
    ///
    /// Fails with `Error::Config` when the URL is blank.
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let webhook_url = webhook_url.into().trim().to_string();
        if webhook_url.is_empty() {
            return Err(Error::config("Teams webhook URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();

        Ok(Self {
            webhook_url,
            client,
        })
    }

    async fn post_card(&self, card: &Value) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(card)
            .send()
            .await
            .map_err(|e| Error::notifier(format!("Teams request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match status.as_u16() {
                400 => Err(Error::notifier(format!(
                    "Teams rejected the card. Status: {} - {}",
                    status, body
                ))),
                404 | 410 => Err(Error::notifier(format!(
                    "Teams webhook not found or removed. Status: {}",
                    status
                ))),
                429 => Err(Error::notifier(format!(
                    "Teams rate limit exceeded. Status: {}",
                    status
                ))),
                500..=599 => Err(Error::notifier(format!(
                    "Teams server error (transient): {} - {}",
                    status, body
                ))),
                _ => Err(Error::notifier(format!(
                    "Teams webhook failed: {} - {}",
                    status, body
                ))),
            };
        }

        debug!(status = %status, "Teams card delivered");
        Ok(())
    }
}

/// Card listing new subdomains, or `None` when the report has none
pub fn new_subdomains_card(report: &Report) -> Option<Value> {
    if report.new_subdomains.is_empty() {
        return None;
    }

    let text = report
        .new_subdomains
        .iter()
        .map(|row| format!("- {}", row.subdomain))
        .collect::<Vec<_>>()
        .join("\n");

    Some(json!({
        "@type": "MessageCard",
        "@context": CARD_CONTEXT,
        "themeColor": THEME_COLOR,
        "summary": NEW_SUBDOMAINS_TITLE,
        "title": NEW_SUBDOMAINS_TITLE,
        "sections": [{
            "activityTitle": "New subdomains have been discovered:",
            "activitySubtitle": report.domain,
            "activityImage": ACTIVITY_IMAGE,
            "markdown": true,
            "text": text,
        }],
    }))
}

/// Card with the port-change table, or `None` when the report has none
pub fn port_report_card(report: &Report) -> Option<Value> {
    if report.port_changes.is_empty() {
        return None;
    }

    Some(json!({
        "@type": "MessageCard",
        "@context": CARD_CONTEXT,
        "themeColor": THEME_COLOR,
        "summary": PORT_REPORT_TITLE,
        "title": PORT_REPORT_TITLE,
        "sections": [{
            "activityTitle": "Port changes were detected",
            "activitySubtitle": report.domain,
            "activityImage": ACTIVITY_IMAGE,
            "markdown": true,
            "text": report.render_port_changes(),
        }],
    }))
}

#[async_trait]
impl Notifier for TeamsNotifier {
    async fn notify(&self, report: &Report) -> Result<()> {
        let cards: Vec<Value> = [new_subdomains_card(report), port_report_card(report)]
            .into_iter()
            .flatten()
            .collect();

        let mut first_error = None;
        for card in &cards {
            if let Err(e) = self.post_card(card).await {
                warn!(domain = %report.domain, error = %e, "Failed to deliver Teams card");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(domain = %report.domain, cards = cards.len(), "Teams notification sent");
                Ok(())
            }
        }
    }

    fn notifier_name(&self) -> &'static str {
        "teams"
    }
}
