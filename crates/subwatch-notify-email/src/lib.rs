// # Email Notifier
//
// This crate mails subwatch reports through an SMTP relay over implicit
// TLS (SMTPS, port 465 by default). Each report becomes one plain-text
// message from the authenticated account to a single recipient.
//
// ### Trust Level: Untrusted (Notifier)
//
// **Allowed Capabilities**:
// - ✅ One authenticated SMTP session per report, to the configured relay
//
// **Forbidden Capabilities**:
// - ❌ Retry logic (a failed message is reported to the dispatcher and dropped)
// - ❌ Deciding whether a report is worth sending (owned by `Dispatcher`)
//
// ## Security Requirements
//
// The SMTP password never appears in logs or in the Debug output.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info};

use subwatch_core::{Error, Notifier, Report, Result};

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// Deadline for one SMTP session
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection and addressing settings for [`EmailNotifier`]
#[derive(Clone)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Login name, also used as the sender address
    pub username: String,
    /// ⚠️ NEVER log this value
    pub password: String,
    pub recipient: String,
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("recipient", &self.recipient)
            .finish()
    }
}

impl EmailSettings {
    /// Settings for the default relay
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            smtp_host: DEFAULT_SMTP_HOST.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            username: username.into(),
            password: password.into(),
            recipient: recipient.into(),
        }
    }

    pub fn with_relay(mut self, host: impl Into<String>, port: u16) -> Self {
        self.smtp_host = host.into();
        self.smtp_port = port;
        self
    }
}

/// Subject line for a report
pub fn subject(report: &Report) -> String {
    format!("Domain Monitoring Report for {}", report.domain)
}

/// SMTP email notifier
pub struct EmailNotifier {
    from: Mailbox,
    to: Mailbox,
    relay: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .field("relay", &self.relay)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl EmailNotifier {
    /// Create a notifier from `settings`
    ///
    /// Fails with `Error::Config` when a field is blank or an address does
    /// not parse. No connection is made until the first report.
    pub fn new(settings: EmailSettings) -> Result<Self> {
        let host = settings.smtp_host.trim();
        if host.is_empty() {
            return Err(Error::config("SMTP host cannot be empty"));
        }
        if settings.smtp_port == 0 {
            return Err(Error::config("SMTP port cannot be 0"));
        }
        if settings.password.is_empty() {
            return Err(Error::config("SMTP password cannot be empty"));
        }

        let from = parse_mailbox("sender", &settings.username)?;
        let to = parse_mailbox("recipient", &settings.recipient)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| Error::config(format!("Invalid SMTP relay '{}': {}", host, e)))?
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.username.trim().to_string(),
                settings.password,
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            from,
            to,
            relay: format!("{}:{}", host, settings.smtp_port),
            transport,
        })
    }

    /// Build the message for `report`
    pub fn build_message(&self, report: &Report) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject(report))
            .header(ContentType::TEXT_PLAIN)
            .body(report.render_text())
            .map_err(|e| Error::notifier(format!("Failed to build email: {}", e)))
    }
}

fn parse_mailbox(role: &str, raw: &str) -> Result<Mailbox> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::config(format!("Email {} cannot be empty", role)));
    }
    raw.parse()
        .map_err(|e| Error::config(format!("Invalid email {} '{}': {}", role, raw, e)))
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, report: &Report) -> Result<()> {
        let message = self.build_message(report)?;
        debug!(domain = %report.domain, relay = %self.relay, "Sending report email");

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::notifier(format!("SMTP delivery via {} failed: {}", self.relay, e)))?;

        info!(domain = %report.domain, "Email notification sent");
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subwatch_core::summary::NewSubdomainRow;

    fn settings() -> EmailSettings {
        EmailSettings::new("watcher@example.com", "app-secret-123", "ops@example.com")
    }

    fn report() -> Report {
        Report {
            domain: "ex.com".to_string(),
            new_subdomains: vec![NewSubdomainRow {
                subdomain: "a.ex.com".to_string(),
                ip: "10.0.0.1".to_string(),
                status: "up".to_string(),
                ports: Vec::new(),
            }],
            port_changes: Vec::new(),
        }
    }

    #[test]
    fn test_subject() {
        assert_eq!(subject(&report()), "Domain Monitoring Report for ex.com");
    }

    #[test]
    fn test_message_headers_and_body() {
        let notifier = EmailNotifier::new(settings()).unwrap();
        let message = notifier.build_message(&report()).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(raw.contains("Subject: Domain Monitoring Report for ex.com"));
        assert!(raw.contains("From: watcher@example.com"));
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("a.ex.com"));
    }

    #[test]
    fn test_blank_fields_rejected() {
        let mut s = settings();
        s.password = String::new();
        assert!(matches!(EmailNotifier::new(s), Err(Error::Config(_))));

        let mut s = settings();
        s.recipient = "  ".to_string();
        assert!(matches!(EmailNotifier::new(s), Err(Error::Config(_))));

        let s = settings().with_relay("", 465);
        assert!(matches!(EmailNotifier::new(s), Err(Error::Config(_))));
    }

    #[test]
    fn test_unparseable_address_rejected() {
        let mut s = settings();
        s.username = "watcher".to_string();
        assert!(matches!(EmailNotifier::new(s), Err(Error::Config(_))));

        let mut s = settings();
        s.recipient = "ops at example".to_string();
        assert!(matches!(EmailNotifier::new(s), Err(Error::Config(_))));
    }

    #[test]
    fn test_password_not_exposed_in_debug() {
        let s = settings();
        assert!(!format!("{:?}", s).contains("app-secret-123"));

        let notifier = EmailNotifier::new(s).unwrap();
        let debug_str = format!("{:?}", notifier);
        assert!(!debug_str.contains("app-secret-123"));
        assert!(debug_str.contains("smtp.gmail.com:465"));
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_reported() {
        // Nothing listens on port 9
        let notifier = EmailNotifier::new(settings().with_relay("127.0.0.1", 9)).unwrap();
        let result = notifier.notify(&report()).await;

        assert!(matches!(result, Err(Error::Notifier(_))));
    }
}
