//! Change summarization
//!
//! [`summarize`] turns a [`ChangeSet`] into a [`Report`]: plain rows with
//! stable ordering that notifiers can render however their channel wants.
//! No I/O happens here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::changes::ChangeSet;
use crate::model::{ServiceInfo, SubdomainRecord};

/// One open port with its service label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEntry {
    pub port: u16,
    pub service: String,
    pub product: String,
    pub version: String,
}

impl PortEntry {
    fn from_service(port: u16, info: Option<&ServiceInfo>) -> Self {
        let info = info.cloned().unwrap_or_default();
        Self {
            port,
            service: info.name,
            product: info.product,
            version: info.version,
        }
    }

    /// `443/https (nginx 1.25)`
    pub fn label(&self) -> String {
        let detail = [self.product.as_str(), self.version.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");

        if detail.is_empty() {
            format!("{}/{}", self.port, self.service)
        } else {
            format!("{}/{} ({})", self.port, self.service, detail)
        }
    }
}

/// Row of the "New subdomains" table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubdomainRow {
    pub subdomain: String,
    pub ip: String,
    pub status: String,
    pub ports: Vec<PortEntry>,
}

/// Row of the "Port changes" table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortChangeRow {
    pub subdomain: String,
    pub old_ip: String,
    pub new_ip: String,
    pub opened: Vec<u16>,
    pub closed: Vec<u16>,
    pub current: Vec<PortEntry>,
}

/// Human-facing summary of one domain's changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub domain: String,
    pub new_subdomains: Vec<NewSubdomainRow>,
    pub port_changes: Vec<PortChangeRow>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.new_subdomains.is_empty() && self.port_changes.is_empty()
    }

    /// Title line used by notifiers
    pub fn title(&self) -> String {
        format!("Subdomain changes for {}", self.domain)
    }

    /// Markdown table of new subdomains; empty string when there are none
    pub fn render_new_subdomains(&self) -> String {
        if self.new_subdomains.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        let _ = writeln!(out, "### New subdomains ({})", self.new_subdomains.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "| Subdomain | IP | Status | Ports |");
        let _ = writeln!(out, "|---|---|---|---|");
        for row in &self.new_subdomains {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                row.subdomain,
                dash_if_empty(&row.ip),
                row.status,
                port_labels(&row.ports)
            );
        }
        out
    }

    /// Markdown table of port changes; empty string when there are none
    pub fn render_port_changes(&self) -> String {
        if self.port_changes.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        let _ = writeln!(out, "### Port changes ({})", self.port_changes.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "| Subdomain | IP | Opened | Closed | Current ports |");
        let _ = writeln!(out, "|---|---|---|---|---|");
        for row in &self.port_changes {
            let ip = if row.old_ip == row.new_ip {
                dash_if_empty(&row.new_ip).to_string()
            } else {
                format!("{} → {}", dash_if_empty(&row.old_ip), dash_if_empty(&row.new_ip))
            };
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                row.subdomain,
                ip,
                port_numbers(&row.opened),
                port_numbers(&row.closed),
                port_labels(&row.current)
            );
        }
        out
    }

    /// Full markdown body; empty string for an empty report
    pub fn render_text(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = format!("## {}\n\n", self.title());
        let new = self.render_new_subdomains();
        let changed = self.render_port_changes();
        out.push_str(&new);
        if !new.is_empty() && !changed.is_empty() {
            out.push('\n');
        }
        out.push_str(&changed);
        out
    }
}

/// Summarize a change set
///
/// Rows are ordered by subdomain and ports ascend, so equal change sets
/// always produce equal reports.
pub fn summarize(changes: &ChangeSet) -> Report {
    let mut new_subdomains: Vec<NewSubdomainRow> = changes
        .new_subdomains
        .iter()
        .map(|entry| NewSubdomainRow {
            subdomain: entry.subdomain.clone(),
            ip: entry.state.ip_address.clone(),
            status: entry.state.reachable.to_string(),
            ports: record_ports(&entry.state),
        })
        .collect();
    new_subdomains.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));

    let mut port_changes: Vec<PortChangeRow> = changes
        .port_changes
        .iter()
        .map(|change| PortChangeRow {
            subdomain: change.subdomain.clone(),
            old_ip: change.old_ip.clone(),
            new_ip: change.new_ip.clone(),
            opened: change.newly_opened.iter().copied().collect(),
            closed: change.newly_closed.iter().copied().collect(),
            current: change
                .new_ports
                .iter()
                .map(|p| PortEntry::from_service(*p, change.services.get(p)))
                .collect(),
        })
        .collect();
    port_changes.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));

    Report {
        domain: changes.domain.clone(),
        new_subdomains,
        port_changes,
    }
}

fn record_ports(record: &SubdomainRecord) -> Vec<PortEntry> {
    let services: &BTreeMap<u16, ServiceInfo> = &record.services;
    record
        .open_ports
        .iter()
        .map(|p| PortEntry::from_service(*p, services.get(p)))
        .collect()
}

fn dash_if_empty(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn port_numbers(ports: &[u16]) -> String {
    if ports.is_empty() {
        return "-".to_string();
    }
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn port_labels(ports: &[PortEntry]) -> String {
    if ports.is_empty() {
        return "-".to_string();
    }
    ports
        .iter()
        .map(PortEntry::label)
        .collect::<Vec<_>>()
        .join(", ")
}
