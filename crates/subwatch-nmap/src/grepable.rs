//! Parser for nmap grepable output (`-oG -`)
//!
//! Only `Host:` lines are read. A host appears on a `Status:` line and,
//! when ports were scanned, on a second line with a `Ports:` field:
//!
//! ```text
//! Host: 45.33.32.156 (scanme.nmap.org)	Status: Up
//! Host: 45.33.32.156 (scanme.nmap.org)	Ports: 22/open/tcp//ssh//OpenSSH 6.6.1p1/, 80/closed/tcp//http///
//! ```
//!
//! Each port entry is `port/state/protocol/owner/service/rpc/version/`.

use subwatch_core::ObservedPort;

/// Host status as reported by nmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Up,
    Down,
    Unknown,
}

/// The first host found in a grepable report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedHost {
    pub ip: String,
    pub status: HostStatus,
    pub open_ports: Vec<ObservedPort>,
}

/// Parse a grepable report, returning the first host it mentions
pub fn parse(output: &str) -> Option<ScannedHost> {
    let mut host: Option<ScannedHost> = None;

    for line in output.lines() {
        let Some(rest) = line.strip_prefix("Host: ") else {
            continue;
        };
        let mut fields = rest.split('\t');
        let ip = fields
            .next()
            .and_then(|target| target.split_whitespace().next())
            .unwrap_or_default()
            .to_string();

        if host.as_ref().is_some_and(|existing| existing.ip != ip) {
            break;
        }
        let entry = host.get_or_insert_with(|| ScannedHost {
            ip,
            status: HostStatus::Unknown,
            open_ports: Vec::new(),
        });

        for field in fields {
            if let Some(status) = field.strip_prefix("Status: ") {
                entry.status = match status.trim() {
                    "Up" => HostStatus::Up,
                    "Down" => HostStatus::Down,
                    _ => HostStatus::Unknown,
                };
            } else if let Some(ports) = field.strip_prefix("Ports: ") {
                entry.open_ports.extend(parse_ports(ports));
                // Ports are only listed for hosts that answered
                entry.status = HostStatus::Up;
            }
        }
    }

    host
}

/// Parse the `Ports:` field, keeping open TCP ports
fn parse_ports(field: &str) -> Vec<ObservedPort> {
    split_entries(field)
        .into_iter()
        .filter_map(|entry| parse_port(&entry))
        .collect()
}

/// Split on `, ` only where the next entry starts with a port number;
/// version strings may contain the separator.
fn split_entries(field: &str) -> Vec<String> {
    let mut entries: Vec<String> = Vec::new();
    for piece in field.split(", ") {
        let starts_entry = piece
            .split('/')
            .next()
            .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
        match entries.last_mut() {
            Some(last) if !starts_entry => {
                last.push_str(", ");
                last.push_str(piece);
            }
            _ => entries.push(piece.to_string()),
        }
    }
    entries
}

fn parse_port(entry: &str) -> Option<ObservedPort> {
    let parts: Vec<&str> = entry.trim().split('/').collect();
    if parts.len() < 3 {
        return None;
    }
    let number: u16 = parts[0].parse().ok()?;
    if number == 0 || parts[1] != "open" || parts[2] != "tcp" {
        return None;
    }

    let mut port = ObservedPort::new(number);
    if let Some(service) = parts.get(4).filter(|s| !s.is_empty()) {
        port = port.with_service(*service);
    }
    if let Some(text) = parts.get(6).filter(|s| !s.is_empty()) {
        let (product, version) = split_version(text);
        if !product.is_empty() {
            port = port.with_product(product);
        }
        if !version.is_empty() {
            port = port.with_version(version);
        }
    }
    Some(port)
}

/// Split nmap's combined version text into product and version
///
/// The product is every word before the first one that starts with a digit:
/// `"Apache httpd 2.4.7 ((Ubuntu))"` gives `("Apache httpd", "2.4.7 ((Ubuntu))")`.
pub fn split_version(text: &str) -> (String, String) {
    let words: Vec<&str> = text.split_whitespace().collect();
    let at = words
        .iter()
        .position(|w| w.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(words.len());
    (words[..at].join(" "), words[at..].join(" "))
}
