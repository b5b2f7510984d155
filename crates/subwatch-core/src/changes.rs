//! Change sets produced by one reconciliation run

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ServiceInfo, SubdomainRecord};

/// A subdomain that was not in the store before this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubdomain {
    pub subdomain: String,
    /// The record as committed
    pub state: SubdomainRecord,
}

/// Port delta for a previously known subdomain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortChange {
    pub subdomain: String,
    pub old_ports: BTreeSet<u16>,
    pub new_ports: BTreeSet<u16>,
    /// `new_ports - old_ports`
    pub newly_opened: BTreeSet<u16>,
    /// `old_ports - new_ports`
    pub newly_closed: BTreeSet<u16>,
    pub old_ip: String,
    pub new_ip: String,
    /// Service metadata for `new_ports`
    pub services: BTreeMap<u16, ServiceInfo>,
}

impl PortChange {
    /// Compute the delta between two port sets.
    ///
    /// Returns `None` when nothing opened or closed.
    pub fn between(
        subdomain: impl Into<String>,
        previous: &SubdomainRecord,
        current: &SubdomainRecord,
    ) -> Option<Self> {
        let newly_opened: BTreeSet<u16> = current
            .open_ports
            .difference(&previous.open_ports)
            .copied()
            .collect();
        let newly_closed: BTreeSet<u16> = previous
            .open_ports
            .difference(&current.open_ports)
            .copied()
            .collect();

        if newly_opened.is_empty() && newly_closed.is_empty() {
            return None;
        }

        Some(Self {
            subdomain: subdomain.into(),
            old_ports: previous.open_ports.clone(),
            new_ports: current.open_ports.clone(),
            newly_opened,
            newly_closed,
            old_ip: previous.ip_address.clone(),
            new_ip: current.ip_address.clone(),
            services: current.services.clone(),
        })
    }
}

/// Everything that changed for one domain during one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub domain: String,
    pub new_subdomains: Vec<NewSubdomain>,
    pub port_changes: Vec<PortChange>,
    /// Subdomains whose record could not be committed this run
    pub failed: Vec<String>,
}

impl ChangeSet {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// True when there is nothing to report.
    ///
    /// Persistence failures are not reportable changes.
    pub fn is_empty(&self) -> bool {
        self.new_subdomains.is_empty() && self.port_changes.is_empty()
    }

    /// Sort every list by subdomain
    pub fn sort(&mut self) {
        self.new_subdomains.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));
        self.port_changes.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));
        self.failed.sort();
    }
}
