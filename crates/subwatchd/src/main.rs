// # subwatchd - Subdomain Monitor Daemon
//
// This daemon is a thin integration layer. All discovery, reconciliation
// and reporting logic lives in subwatch-core and the adapter crates.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring sources, validator, observer, store and notifiers
// 4. Running the monitor until SIGTERM/SIGINT (or one pass with RUN_ONCE)
//
// ## Configuration
//
// ### Domains
// - `SUBWATCH_DOMAINS` (fallback `DOMAINS`): comma-separated root domains
//
// ### State Store
// - `SUBWATCH_STORE_TYPE`: `sqlite` (default) or `memory`
// - `SUBWATCH_DB_PATH`: SQLite path (default `subwatch.db`)
//
// ### Notifications
// - `SUBWATCH_TEAMS_WEBHOOK_URL` (fallback `TEAMS_WEBHOOK_URL`): Teams webhook
// - `SUBWATCH_EMAIL_USER` (fallback `EMAIL_USER`): SMTP login and sender
// - `SUBWATCH_EMAIL_PASSWORD` (fallback `EMAIL_PASSWORD`): SMTP password
// - `SUBWATCH_EMAIL_TO` (fallback `EMAIL_TO`): report recipient
// - `SUBWATCH_SMTP_HOST`: SMTPS relay (default `smtp.gmail.com`)
// - `SUBWATCH_SMTP_PORT`: SMTPS port (default 465)
//
// Email is enabled only when user, password and recipient are all set.
//
// ### Scanning
// - `SUBWATCH_SCAN_CONCURRENCY`: concurrent host scans (1-64, default 4)
// - `SUBWATCH_SCAN_TIMEOUT_SECS`: per-host deadline (1-3600, default 60)
// - `SUBWATCH_NMAP_PATH`: scanner binary (default `nmap`)
// - `SUBWATCH_NMAP_ARGS`: scanner arguments (default `--top-ports 100 -sV`)
//
// ### Scheduling
// - `SUBWATCH_INTERVAL_SECS`: delay between passes (60-604800, default 3600)
// - `SUBWATCH_RUN_ONCE`: run a single pass then exit
//
// ## Example
//
// ```bash
// export SUBWATCH_DOMAINS=example.com,example.org
// export SUBWATCH_DB_PATH=/var/lib/subwatch/subwatch.db
// export SUBWATCH_TEAMS_WEBHOOK_URL=https://example.webhook.office.com/...
//
// subwatchd
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use subwatch_core::{
    Dispatcher, EngineConfig, Monitor, MonitorConfig, ReconcileEngine, SourceAggregator,
    StoreConfig, WatchConfig, config::is_valid_domain, open_store, parse_domains,
};
use subwatch_dns::DnsValidator;
use subwatch_nmap::{DEFAULT_NMAP_ARGS, NmapObserver};

/// Default SMTPS relay
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 465;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SubwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SubwatchExitCode> for ExitCode {
    fn from(code: SubwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    domains: Vec<String>,
    store_type: String,
    db_path: String,
    teams_webhook_url: Option<String>,
    email_user: Option<String>,
    email_password: Option<String>,
    email_to: Option<String>,
    smtp_host: String,
    smtp_port: u16,
    scan_concurrency: usize,
    scan_timeout_secs: u64,
    interval_secs: u64,
    run_once: bool,
    nmap_path: String,
    nmap_args: String,
    log_level: String,
}

/// Read `primary`, falling back to `legacy`
fn var_with_fallback(primary: &str, legacy: &str) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| env::var(legacy).ok())
        .filter(|v| !v.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a whole number. Got: '{}'", name, raw)),
        _ => Ok(default),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let defaults = EngineConfig::default();
        let monitor_defaults = MonitorConfig::default();

        Ok(Self {
            domains: var_with_fallback("SUBWATCH_DOMAINS", "DOMAINS")
                .map(|raw| parse_domains(&raw))
                .unwrap_or_default(),
            store_type: env::var("SUBWATCH_STORE_TYPE").unwrap_or_else(|_| "sqlite".to_string()),
            db_path: env::var("SUBWATCH_DB_PATH").unwrap_or_else(|_| "subwatch.db".to_string()),
            teams_webhook_url: var_with_fallback("SUBWATCH_TEAMS_WEBHOOK_URL", "TEAMS_WEBHOOK_URL"),
            email_user: var_with_fallback("SUBWATCH_EMAIL_USER", "EMAIL_USER"),
            email_password: var_with_fallback("SUBWATCH_EMAIL_PASSWORD", "EMAIL_PASSWORD"),
            email_to: var_with_fallback("SUBWATCH_EMAIL_TO", "EMAIL_TO"),
            smtp_host: env::var("SUBWATCH_SMTP_HOST")
                .unwrap_or_else(|_| DEFAULT_SMTP_HOST.to_string()),
            smtp_port: parse_number("SUBWATCH_SMTP_PORT", DEFAULT_SMTP_PORT)?,
            scan_concurrency: parse_number("SUBWATCH_SCAN_CONCURRENCY", defaults.scan_concurrency)?,
            scan_timeout_secs: parse_number(
                "SUBWATCH_SCAN_TIMEOUT_SECS",
                defaults.scan_timeout_secs,
            )?,
            interval_secs: parse_number("SUBWATCH_INTERVAL_SECS", monitor_defaults.interval_secs)?,
            run_once: env::var("SUBWATCH_RUN_ONCE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            nmap_path: env::var("SUBWATCH_NMAP_PATH").unwrap_or_else(|_| "nmap".to_string()),
            nmap_args: env::var("SUBWATCH_NMAP_ARGS")
                .unwrap_or_else(|_| DEFAULT_NMAP_ARGS.to_string()),
            log_level: env::var("SUBWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.domains.is_empty() {
            anyhow::bail!(
                "SUBWATCH_DOMAINS must contain at least one domain. \
                Set it via: export SUBWATCH_DOMAINS=example.com,example.org"
            );
        }

        for domain in &self.domains {
            if !is_valid_domain(domain) {
                anyhow::bail!(
                    "SUBWATCH_DOMAINS contains an invalid domain name: '{}'",
                    domain
                );
            }
        }

        match self.store_type.as_str() {
            "sqlite" => {
                if self.db_path.trim().is_empty() {
                    anyhow::bail!(
                        "SUBWATCH_DB_PATH cannot be empty when SUBWATCH_STORE_TYPE=sqlite"
                    );
                }
            }
            "memory" => {}
            _ => anyhow::bail!(
                "SUBWATCH_STORE_TYPE '{}' is not supported. \
                Supported types: sqlite, memory",
                self.store_type
            ),
        }

        if let Some(ref url) = self.teams_webhook_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            anyhow::bail!("SUBWATCH_TEAMS_WEBHOOK_URL must use HTTP or HTTPS scheme");
        }

        let email_parts = [&self.email_user, &self.email_password, &self.email_to];
        let email_set = email_parts.iter().filter(|v| v.is_some()).count();
        if email_set != 0 && email_set != email_parts.len() {
            anyhow::bail!(
                "SUBWATCH_EMAIL_USER, SUBWATCH_EMAIL_PASSWORD and SUBWATCH_EMAIL_TO \
                must be set together"
            );
        }

        if self.email_configured() {
            for (name, value) in [
                ("SUBWATCH_EMAIL_USER", &self.email_user),
                ("SUBWATCH_EMAIL_TO", &self.email_to),
            ] {
                if let Some(address) = value
                    && !address.contains('@')
                {
                    anyhow::bail!("{} must be an email address. Got: '{}'", name, address);
                }
            }

            if self.smtp_host.trim().is_empty() {
                anyhow::bail!("SUBWATCH_SMTP_HOST cannot be empty when email is configured");
            }

            if self.smtp_port == 0 {
                anyhow::bail!("SUBWATCH_SMTP_PORT must be between 1 and 65535. Got: 0");
            }
        }

        if !(1..=64).contains(&self.scan_concurrency) {
            anyhow::bail!(
                "SUBWATCH_SCAN_CONCURRENCY must be between 1 and 64. Got: {}",
                self.scan_concurrency
            );
        }

        if !(1..=3600).contains(&self.scan_timeout_secs) {
            anyhow::bail!(
                "SUBWATCH_SCAN_TIMEOUT_SECS must be between 1 and 3600 seconds. Got: {}",
                self.scan_timeout_secs
            );
        }

        if !(60..=604_800).contains(&self.interval_secs) {
            anyhow::bail!(
                "SUBWATCH_INTERVAL_SECS must be between 60 and 604800 seconds. Got: {}",
                self.interval_secs
            );
        }

        if self.nmap_path.trim().is_empty() {
            anyhow::bail!("SUBWATCH_NMAP_PATH cannot be empty");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "SUBWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn email_configured(&self) -> bool {
        self.email_user.is_some() && self.email_password.is_some() && self.email_to.is_some()
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn watch_config(&self) -> WatchConfig {
        let store = match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            _ => StoreConfig::Sqlite {
                path: self.db_path.clone(),
            },
        };

        let mut config = WatchConfig::new().with_domains(self.domains.iter().cloned());
        config.store = store;
        config.engine.scan_concurrency = self.scan_concurrency;
        config.engine.scan_timeout_secs = self.scan_timeout_secs;
        config.monitor.interval_secs = self.interval_secs;
        config.monitor.run_once = self.run_once;
        config
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SubwatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SubwatchExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SubwatchExitCode::ConfigError.into();
    }

    info!("Starting subwatchd");
    info!("Configuration loaded: {} domain(s)", config.domains.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SubwatchExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let monitor = match build_monitor(&config) {
            Ok(monitor) => monitor,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return SubwatchExitCode::ConfigError;
            }
        };

        match run_daemon(monitor).await {
            Ok(()) => SubwatchExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                SubwatchExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Wire every component and create the monitor
///
/// Must run inside the runtime: the resolver and the event logger need it.
fn build_monitor(config: &Config) -> Result<Monitor> {
    let watch = config.watch_config();
    watch.validate().context("Invalid monitor configuration")?;

    info!("State store type: {}", watch.store.type_name());
    let store = open_store(&watch.store).context("Failed to open state store")?;

    let observer = Arc::new(NmapObserver::with_command(&config.nmap_path, &config.nmap_args));
    info!("Port observer: {} {}", config.nmap_path, config.nmap_args);

    let engine = ReconcileEngine::new(observer, store, watch.engine.clone())
        .context("Failed to create reconcile engine")?;

    let mut aggregator = SourceAggregator::new();
    subwatch_sources::register_all(&mut aggregator);
    info!("Discovery sources: {}", aggregator.source_names().join(", "));

    let validator = Arc::new(DnsValidator::new());

    let dispatcher = build_dispatcher(config)?;

    let (monitor, mut events) = Monitor::new(&watch, aggregator, validator, engine, dispatcher)
        .context("Failed to create monitor")?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "Monitor event");
        }
    });

    for domain in &watch.domains {
        info!("Monitoring domain: {}", domain);
    }

    Ok(monitor)
}

fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new();
    register_teams(config, &mut dispatcher)?;
    register_email(config, &mut dispatcher)?;
    if dispatcher.notifier_count() == 0 {
        warn!("No notifier configured, changes will only be logged");
    }
    Ok(dispatcher)
}

#[cfg(feature = "teams")]
fn register_teams(config: &Config, dispatcher: &mut Dispatcher) -> Result<()> {
    match config.teams_webhook_url {
        Some(ref url) => {
            let notifier = subwatch_notify_teams::TeamsNotifier::new(url.as_str())
                .context("Failed to create Teams notifier")?;
            dispatcher.add_notifier(Arc::new(notifier));
            info!("Registered Teams notifier");
        }
        None => info!("SUBWATCH_TEAMS_WEBHOOK_URL not set, Teams notifications disabled"),
    }
    Ok(())
}

#[cfg(not(feature = "teams"))]
fn register_teams(config: &Config, _dispatcher: &mut Dispatcher) -> Result<()> {
    if config.teams_webhook_url.is_some() {
        warn!("Teams webhook configured but the teams feature is disabled");
    }
    Ok(())
}

#[cfg(feature = "email")]
fn register_email(config: &Config, dispatcher: &mut Dispatcher) -> Result<()> {
    match (&config.email_user, &config.email_password, &config.email_to) {
        (Some(user), Some(password), Some(to)) => {
            let settings = subwatch_notify_email::EmailSettings::new(user, password, to)
                .with_relay(config.smtp_host.as_str(), config.smtp_port);
            let notifier = subwatch_notify_email::EmailNotifier::new(settings)
                .context("Failed to create email notifier")?;
            dispatcher.add_notifier(Arc::new(notifier));
            info!("Registered email notifier via {}:{}", config.smtp_host, config.smtp_port);
        }
        _ => info!("SUBWATCH_EMAIL_* not set, email notifications disabled"),
    }
    Ok(())
}

#[cfg(not(feature = "email"))]
fn register_email(config: &Config, _dispatcher: &mut Dispatcher) -> Result<()> {
    if config.email_configured() {
        warn!("Email configured but the email feature is disabled");
    }
    Ok(())
}

/// Run the monitor until a shutdown signal or the end of a single pass
async fn run_daemon(monitor: Monitor) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let signals = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => {
                info!("Received shutdown signal: {}", signal);
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                // Keep the sender alive; dropping it would stop the monitor
                error!("Signal handling unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    let result = monitor.run_with_shutdown(shutdown_rx).await;
    signals.abort();

    result.context("Monitor failed")?;
    info!("Daemon stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
