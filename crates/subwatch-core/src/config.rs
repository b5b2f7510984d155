//! Configuration types for the subwatch system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main subwatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Root domains to monitor
    pub domains: Vec<String>,

    /// World-state store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Reconciliation engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Monitor loop settings
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl WatchConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            domains: Vec::new(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }

    /// Set the monitored domains
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.domains.is_empty() {
            return Err(crate::Error::config("No domains configured"));
        }

        for domain in &self.domains {
            if !is_valid_domain(domain) {
                return Err(crate::Error::config(format!(
                    "Malformed domain name: {:?}",
                    domain
                )));
            }
        }

        self.store.validate()?;
        self.engine.validate()?;
        self.monitor.validate()?;

        Ok(())
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// World-state store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// SQLite database file
    Sqlite {
        /// Path to the database file
        path: String,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::Sqlite { path } if path.trim().is_empty() => {
                Err(crate::Error::config("SQLite database path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreConfig::Sqlite { .. } => "sqlite",
            StoreConfig::Memory => "memory",
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: "subwatch.db".to_string(),
        }
    }
}

/// Reconciliation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of port observer calls in flight per domain
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,

    /// Deadline for a single port observer call (in seconds)
    ///
    /// A scan that exceeds it is recorded as `unknown` reachability with
    /// every port closed.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.scan_concurrency == 0 {
            return Err(crate::Error::config("scan_concurrency must be > 0"));
        }
        if self.scan_timeout_secs == 0 {
            return Err(crate::Error::config("scan_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_concurrency: default_scan_concurrency(),
            scan_timeout_secs: default_scan_timeout_secs(),
        }
    }
}

/// Monitor loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between passes (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Run a single pass and return
    #[serde(default)]
    pub run_once: bool,

    /// Capacity of the monitor event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        if !self.run_once && self.interval_secs == 0 {
            return Err(crate::Error::config("interval_secs must be > 0"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_once: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_scan_concurrency() -> usize {
    4
}

fn default_scan_timeout_secs() -> u64 {
    60
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Parse a comma-separated domain list.
///
/// Tolerates a surrounding `{...}`, whitespace around entries, and trailing
/// dots. Empty entries and duplicates are dropped; order is preserved.
pub fn parse_domains(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed);

    let mut domains: Vec<String> = Vec::new();
    for part in inner.split(',') {
        let name = part
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim_end_matches('.')
            .to_ascii_lowercase();
        if !name.is_empty() && !domains.contains(&name) {
            domains.push(name);
        }
    }
    domains
}

/// Loose syntactic check for a root domain name
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
        return false;
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}
