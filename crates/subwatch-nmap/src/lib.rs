// # nmap Port Observer
//
// This crate provides a PortObserver that shells out to `nmap` and parses
// its grepable output.
//
// ## Scan Flow
//
// 1. `nmap <args> -oG - <host>`
// 2. If nmap is missing, exits non-zero, or reports no open port, HEAD
//    probes are sent to the common web ports
// 3. If no address was learned, the host is resolved with the system
//    resolver
//
// ## Failure Semantics
//
// `scan()` does not return `Err`. A host where every step fails is
// reported as unreachable. The overall deadline is enforced by the engine,
// which drops this future on timeout; the child process is killed on drop.

pub mod grepable;

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use subwatch_core::{Error, Observation, ObservedPort, PortObserver};

use grepable::{HostStatus, ScannedHost};

/// Default scanner arguments
pub const DEFAULT_NMAP_ARGS: &str = "--top-ports 100 -sV";

/// Timeout of each HTTP probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One HTTP fallback probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbe {
    pub port: u16,
    pub service: &'static str,
    pub tls: bool,
}

impl HttpProbe {
    pub const fn new(port: u16, service: &'static str, tls: bool) -> Self {
        Self { port, service, tls }
    }

    fn url(&self, host: &str) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        let default_port = if self.tls { 443 } else { 80 };
        if self.port == default_port {
            format!("{}://{}", scheme, host)
        } else {
            format!("{}://{}:{}", scheme, host, self.port)
        }
    }
}

/// Probes sent when nmap finds nothing
pub const DEFAULT_PROBES: [HttpProbe; 4] = [
    HttpProbe::new(80, "http", false),
    HttpProbe::new(443, "https", true),
    HttpProbe::new(8080, "http-alt", false),
    HttpProbe::new(8443, "https-alt", true),
];

/// Port observer backed by the nmap binary
pub struct NmapObserver {
    nmap_path: String,
    args: Vec<String>,
    probes: Vec<HttpProbe>,
    client: reqwest::Client,
}

impl NmapObserver {
    /// Create an observer using `nmap` from `PATH` with the default arguments
    pub fn new() -> Self {
        Self::with_command("nmap", DEFAULT_NMAP_ARGS)
    }

    /// Create an observer with an explicit binary and argument string
    pub fn with_command(nmap_path: impl Into<String>, args: &str) -> Self {
        // Certificates are not validated; probes only test whether a server answers
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap_or_default();

        Self {
            nmap_path: nmap_path.into(),
            args: args.split_whitespace().map(str::to_string).collect(),
            probes: DEFAULT_PROBES.to_vec(),
            client,
        }
    }

    /// Replace the HTTP fallback probes
    pub fn with_probes(mut self, probes: Vec<HttpProbe>) -> Self {
        self.probes = probes;
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    async fn run_nmap(&self, host: &str) -> Option<ScannedHost> {
        let output = Command::new(&self.nmap_path)
            .args(&self.args)
            .args(["-oG", "-"])
            .arg(host)
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!(host = %host, nmap = %self.nmap_path, error = %e, "Failed to run nmap");
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(host = %host, status = %output.status, stderr = %stderr.trim(), "nmap failed");
            return None;
        }

        let scanned = grepable::parse(&String::from_utf8_lossy(&output.stdout));
        if scanned.is_none() {
            debug!(host = %host, "nmap reported no host");
        }
        scanned
    }

    async fn probe_http(&self, host: &str) -> Vec<ObservedPort> {
        let mut open = Vec::new();
        for probe in &self.probes {
            let url = probe.url(host);
            match self.client.head(&url).send().await {
                Ok(response) if response.status().as_u16() < 500 => {
                    let status = response.status().as_u16();
                    let server = response
                        .headers()
                        .get(reqwest::header::SERVER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    debug!(host = %host, port = probe.port, status = status, "HTTP probe answered");

                    let mut port = ObservedPort::new(probe.port)
                        .with_service(probe.service)
                        .with_product(format!("HTTP server (status: {})", status));
                    if !server.is_empty() {
                        port = port.with_version(server);
                    }
                    open.push(port);
                }
                Ok(response) => {
                    debug!(host = %host, port = probe.port, status = %response.status(), "HTTP probe rejected");
                }
                Err(e) => {
                    debug!(host = %host, port = probe.port, error = %e, "HTTP probe failed");
                }
            }
        }
        open
    }

    async fn resolve(host: &str) -> String {
        match tokio::net::lookup_host((host, 0)).await {
            Ok(mut addrs) => addrs.next().map(|a| a.ip().to_string()).unwrap_or_default(),
            Err(e) => {
                debug!(host = %host, error = %e, "Resolution failed");
                String::new()
            }
        }
    }
}

impl Default for NmapObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortObserver for NmapObserver {
    async fn scan(&self, host: &str) -> Result<Observation, Error> {
        // Refuse names nmap would read as options
        if host.is_empty() || host.starts_with('-') {
            warn!(host = %host, "Refusing to scan invalid host");
            return Ok(Observation::unreachable(""));
        }

        let scanned = self.run_nmap(host).await;
        if let Some(found) = scanned.as_ref().filter(|s| !s.open_ports.is_empty()) {
            debug!(host = %host, ip = %found.ip, ports = found.open_ports.len(), "nmap scan complete");
            return Ok(Observation::up(found.ip.clone(), found.open_ports.clone()));
        }

        let probed = self.probe_http(host).await;

        let mut ip = scanned.as_ref().map(|s| s.ip.clone()).unwrap_or_default();
        if ip.is_empty() {
            ip = Self::resolve(host).await;
        }

        let nmap_up = scanned.as_ref().is_some_and(|s| s.status == HostStatus::Up);
        if !probed.is_empty() || nmap_up {
            Ok(Observation::up(ip, probed))
        } else {
            Ok(Observation::unreachable(ip))
        }
    }

    fn observer_name(&self) -> &'static str {
        "nmap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subwatch_core::Reachability;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn missing_nmap() -> NmapObserver {
        NmapObserver::with_command("/nonexistent/nmap", DEFAULT_NMAP_ARGS)
    }

    #[test]
    fn test_probe_urls() {
        assert_eq!(DEFAULT_PROBES[0].url("a.ex.com"), "http://a.ex.com");
        assert_eq!(DEFAULT_PROBES[1].url("a.ex.com"), "https://a.ex.com");
        assert_eq!(DEFAULT_PROBES[2].url("a.ex.com"), "http://a.ex.com:8080");
        assert_eq!(DEFAULT_PROBES[3].url("a.ex.com"), "https://a.ex.com:8443");
    }

    #[test]
    fn test_args_split() {
        let observer = NmapObserver::with_command("nmap", "  -Pn  --top-ports 10 ");
        assert_eq!(observer.args(), ["-Pn", "--top-ports", "10"]);
    }

    #[tokio::test]
    async fn test_http_fallback_when_nmap_missing() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(403).insert_header("Server", "nginx/1.25.3"))
            .mount(&server)
            .await;
        let port = server.address().port();

        let observer =
            missing_nmap().with_probes(vec![HttpProbe::new(port, "http-alt", false)]);
        let observation = observer.scan("127.0.0.1").await.unwrap();

        assert_eq!(observation.reachability, Reachability::Up);
        assert_eq!(observation.ip, "127.0.0.1");
        assert_eq!(observation.ports.len(), 1);
        let probed = &observation.ports[0];
        assert_eq!(probed.number, port);
        assert_eq!(probed.service_name.as_deref(), Some("http-alt"));
        assert_eq!(probed.product.as_deref(), Some("HTTP server (status: 403)"));
        assert_eq!(probed.version.as_deref(), Some("nginx/1.25.3"));
    }

    #[tokio::test]
    async fn test_server_error_is_not_open() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let port = server.address().port();

        let observer = missing_nmap().with_probes(vec![HttpProbe::new(port, "http", false)]);
        let observation = observer.scan("127.0.0.1").await.unwrap();

        assert_eq!(observation.reachability, Reachability::Down);
        assert!(observation.ports.is_empty());
    }

    #[tokio::test]
    async fn test_total_failure_is_unreachable() {
        let observer = missing_nmap().with_probes(Vec::new());
        let observation = observer.scan("host.subwatch.invalid").await.unwrap();

        assert_eq!(observation.reachability, Reachability::Down);
        assert!(observation.ip.is_empty());
    }

    #[tokio::test]
    async fn test_option_like_host_refused() {
        let observation = missing_nmap().scan("-iL/etc/passwd").await.unwrap();
        assert_eq!(observation.reachability, Reachability::Down);
    }
}
