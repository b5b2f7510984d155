//! World-state data model
//!
//! - [`SubdomainRecord`]: last-known state of one `(domain, subdomain)` pair
//! - [`Observation`]: what a port observer saw for one host, right now
//! - [`Reachability`]: tri-state host status
//! - [`ServiceInfo`]: service metadata attached to an open port

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Service name stored for open ports the observer could not identify
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Host reachability as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    /// Host answered the scan
    Up,
    /// Host did not answer, or the scanner reported it down
    Down,
    /// The scan itself failed or timed out
    #[default]
    Unknown,
}

impl Reachability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored value, mapping anything unrecognised to `Unknown`.
    ///
    /// Older databases stored free-form strings such as `"yes"`/`"no"`.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or(Self::Unknown)
    }
}

impl std::str::FromStr for Reachability {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "yes" | "true" | "active" => Ok(Self::Up),
            "down" | "no" | "false" | "inactive" => Ok(Self::Down),
            "unknown" | "" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for Reachability {
    fn from(reachable: bool) -> Self {
        if reachable { Self::Up } else { Self::Down }
    }
}

/// Service metadata for one open port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub version: String,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        product: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            product: product.into(),
            version: version.into(),
        }
    }

    /// Placeholder entry for a port with no metadata
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_SERVICE, "", "")
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_SERVICE && self.product.is_empty() && self.version.is_empty()
    }
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

/// One open port reported by a port observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedPort {
    pub number: u16,
    pub service_name: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

impl ObservedPort {
    /// A bare open port with no service metadata
    pub fn new(number: u16) -> Self {
        Self {
            number,
            service_name: None,
            product: None,
            version: None,
        }
    }

    pub fn with_service(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Service metadata, with `name = "unknown"` when none was reported
    pub fn service_info(&self) -> ServiceInfo {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        ServiceInfo {
            name: non_empty(&self.service_name).unwrap_or_else(|| UNKNOWN_SERVICE.to_string()),
            product: non_empty(&self.product).unwrap_or_default(),
            version: non_empty(&self.version).unwrap_or_default(),
        }
    }
}

/// Result of scanning one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub reachability: Reachability,
    /// Resolved address; empty when unknown
    pub ip: String,
    pub ports: Vec<ObservedPort>,
}

impl Observation {
    /// Host answered with the given open ports
    pub fn up(ip: impl Into<String>, ports: Vec<ObservedPort>) -> Self {
        Self {
            reachability: Reachability::Up,
            ip: ip.into(),
            ports,
        }
    }

    /// Host did not answer
    pub fn unreachable(ip: impl Into<String>) -> Self {
        Self {
            reachability: Reachability::Down,
            ip: ip.into(),
            ports: Vec::new(),
        }
    }

    /// The scan failed before producing a result
    pub fn unknown() -> Self {
        Self {
            reachability: Reachability::Unknown,
            ip: String::new(),
            ports: Vec::new(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachability == Reachability::Up
    }

    /// Open ports as a set. Empty unless the host is up: an unreachable
    /// host is treated as having every port closed.
    pub fn open_ports(&self) -> BTreeSet<u16> {
        if !self.is_reachable() {
            return BTreeSet::new();
        }
        self.ports.iter().map(|p| p.number).collect()
    }

    /// Service metadata keyed by open port.
    ///
    /// When a port is reported more than once, an entry with real metadata
    /// wins over an `unknown` one.
    pub fn services(&self) -> BTreeMap<u16, ServiceInfo> {
        let mut services = BTreeMap::new();
        if !self.is_reachable() {
            return services;
        }

        for port in &self.ports {
            let info = port.service_info();
            match services.get(&port.number) {
                Some(existing) if !ServiceInfo::is_unknown(existing) => {}
                _ => {
                    services.insert(port.number, info);
                }
            }
        }
        services
    }
}

/// Last-known state of one subdomain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainRecord {
    pub domain: String,
    pub subdomain: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_scanned_at: DateTime<Utc>,
    pub ip_address: String,
    pub reachable: Reachability,
    pub open_ports: BTreeSet<u16>,
    pub services: BTreeMap<u16, ServiceInfo>,
}

impl SubdomainRecord {
    /// Build a record for a subdomain seen for the first time
    pub fn from_observation(
        domain: impl Into<String>,
        subdomain: impl Into<String>,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            domain: domain.into(),
            subdomain: subdomain.into(),
            first_seen_at: now,
            last_scanned_at: now,
            ip_address: String::new(),
            reachable: Reachability::Unknown,
            open_ports: BTreeSet::new(),
            services: BTreeMap::new(),
        };
        record.apply_observation(observation, now);
        record
    }

    /// Overwrite the observed fields with a fresh observation.
    ///
    /// `first_seen_at` is left alone. A failed scan that learned no address
    /// keeps the previously stored one.
    pub fn apply_observation(&mut self, observation: &Observation, now: DateTime<Utc>) {
        self.last_scanned_at = now;
        self.reachable = observation.reachability;
        if !observation.ip.is_empty() || observation.reachability != Reachability::Unknown {
            self.ip_address = observation.ip.clone();
        }
        self.open_ports = observation.open_ports();
        self.services = observation.services();
        self.prune_services();
    }

    /// Restore `services` ⊆ `open_ports`, and give every open port an entry.
    pub fn prune_services(&mut self) {
        let open = &self.open_ports;
        self.services.retain(|port, _| open.contains(port));
        for port in &self.open_ports {
            self.services.entry(*port).or_insert_with(ServiceInfo::unknown);
        }
    }

    /// True when every service key is an open port and vice versa
    pub fn services_consistent(&self) -> bool {
        self.services.len() == self.open_ports.len()
            && self.services.keys().all(|p| self.open_ports.contains(p))
    }
}
