// # SQLite World Store
//
// SQLite implementation of WorldStateStore.
//
// ## Layout
//
// - `subdomains`: one row per `(domain, subdomain)`, `UNIQUE(domain, subdomain)`
// - `subdomain_ports`: one row per open port with its service metadata
//
// A record and its ports are written in one transaction. The reader only
// returns port rows that belong to a parent row, so orphans left behind by
// older builds are ignored.
//
// ## Concurrency
//
// One connection guarded by a mutex; statements run on the blocking pool.
// Writers for any key serialize, last write wins.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use super::migrations;
use crate::Error;
use crate::model::{Reachability, ServiceInfo, SubdomainRecord, UNKNOWN_SERVICE};
use crate::traits::WorldStateStore;

/// SQLite-backed world-state store
///
/// # Example
///
/// ```rust,no_run
/// use subwatch_core::state::SqliteWorldStore;
/// use subwatch_core::WorldStateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = SqliteWorldStore::open("/var/lib/subwatch/subwatch.db")?;
///     let domains = store.domains().await?;
///     println!("{} domains tracked", domains.len());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteWorldStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteWorldStore {
    /// Open or create the database at `path` and apply pending migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::initialize(conn, Some(path.to_path_buf()))?;
        info!("Opened SQLite world store at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, None)
    }

    fn initialize(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, Error> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let applied = migrations::run(&mut conn)?;
        if applied > 0 {
            info!(
                "Database schema upgraded to version {} ({} migration(s))",
                migrations::latest_version(),
                applied
            );
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Connection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::store("SQLite connection mutex poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::store(format!("SQLite task failed: {}", e)))?
    }
}

#[async_trait]
impl WorldStateStore for SqliteWorldStore {
    async fn load_domain(&self, domain: &str) -> Result<Vec<SubdomainRecord>, Error> {
        let domain = domain.to_string();
        self.with_conn(move |conn| read_records(conn, &domain, None))
            .await
    }

    async fn get(&self, domain: &str, subdomain: &str) -> Result<Option<SubdomainRecord>, Error> {
        let domain = domain.to_string();
        let subdomain = subdomain.to_string();
        let mut records = self
            .with_conn(move |conn| read_records(conn, &domain, Some(&subdomain)))
            .await?;
        Ok(records.pop())
    }

    async fn upsert(&self, record: &SubdomainRecord) -> Result<(), Error> {
        let mut record = record.clone();
        record.prune_services();
        self.with_conn(move |conn| write_record(conn, &record)).await
    }

    async fn domains(&self) -> Result<Vec<String>, Error> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT domain FROM subdomains ORDER BY domain")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let domains = rows.collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(domains)
        })
        .await
    }

    async fn flush(&self) -> Result<(), Error> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .optional()?;
            Ok(())
        })
        .await
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    let value = value?;
    match DateTime::parse_from_rfc3339(&value) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!("Unreadable timestamp {:?}: {}", value, e);
            None
        }
    }
}

fn write_record(conn: &mut Connection, record: &SubdomainRecord) -> Result<(), Error> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO subdomains (domain, subdomain, first_seen_at, last_scanned_at, ip_address, reachable)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(domain, subdomain) DO UPDATE SET
             last_scanned_at = excluded.last_scanned_at,
             ip_address = excluded.ip_address,
             reachable = excluded.reachable",
        params![
            record.domain,
            record.subdomain,
            format_timestamp(&record.first_seen_at),
            format_timestamp(&record.last_scanned_at),
            record.ip_address,
            record.reachable.as_str(),
        ],
    )?;

    tx.execute(
        "DELETE FROM subdomain_ports WHERE domain = ?1 AND subdomain = ?2",
        params![record.domain, record.subdomain],
    )?;

    {
        let mut insert = tx.prepare(
            "INSERT INTO subdomain_ports (domain, subdomain, port, service_name, product, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for port in &record.open_ports {
            let info = record.services.get(port).cloned().unwrap_or_default();
            insert.execute(params![
                record.domain,
                record.subdomain,
                i64::from(*port),
                info.name,
                info.product,
                info.version,
            ])?;
        }
    }

    tx.commit()?;
    Ok(())
}

type PortRows = HashMap<String, (BTreeSet<u16>, BTreeMap<u16, ServiceInfo>)>;

fn read_records(
    conn: &mut Connection,
    domain: &str,
    subdomain: Option<&str>,
) -> Result<Vec<SubdomainRecord>, Error> {
    let mut records = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT subdomain, first_seen_at, last_scanned_at, ip_address, reachable
             FROM subdomains
             WHERE domain = ?1 AND (?2 IS NULL OR subdomain = ?2)
             ORDER BY subdomain",
        )?;
        let rows = stmt.query_map(params![domain, subdomain], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        for row in rows {
            let (name, first_seen, last_scanned, ip, reachable) = row?;
            let first_seen_at = parse_timestamp(first_seen).unwrap_or_default();
            let last_scanned_at = parse_timestamp(last_scanned).unwrap_or(first_seen_at);

            records.push(SubdomainRecord {
                domain: domain.to_string(),
                subdomain: name,
                first_seen_at,
                last_scanned_at,
                ip_address: ip.unwrap_or_default(),
                reachable: reachable
                    .as_deref()
                    .map(Reachability::parse_lenient)
                    .unwrap_or_default(),
                open_ports: BTreeSet::new(),
                services: BTreeMap::new(),
            });
        }
    }

    let mut ports = read_ports(conn, domain, subdomain)?;
    for record in &mut records {
        if let Some((open, services)) = ports.remove(&record.subdomain) {
            record.open_ports = open;
            record.services = services;
        }
        record.prune_services();
    }

    Ok(records)
}

fn read_ports(conn: &Connection, domain: &str, subdomain: Option<&str>) -> Result<PortRows, Error> {
    let mut stmt = conn.prepare(
        "SELECT subdomain, port, service_name, product, version
         FROM subdomain_ports
         WHERE domain = ?1 AND (?2 IS NULL OR subdomain = ?2)
         ORDER BY subdomain, port",
    )?;
    let rows = stmt.query_map(params![domain, subdomain], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut ports: PortRows = HashMap::new();
    for row in rows {
        let (name, port, service, product, version) = row?;
        let Ok(port) = u16::try_from(port) else {
            warn!("Ignoring out-of-range port {} for {}", port, name);
            continue;
        };

        let service = service
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_SERVICE.to_string());
        let entry = ports.entry(name).or_default();
        entry.0.insert(port);
        entry.1.insert(
            port,
            ServiceInfo::new(service, product.unwrap_or_default(), version.unwrap_or_default()),
        );
    }

    Ok(ports)
}
