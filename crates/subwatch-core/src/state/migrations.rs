// # SQLite Schema Migrations
//
// Versioned, ordered list of schema steps. Each applied version is recorded
// in `schema_migrations`; a step runs at most once per database. Steps are
// also idempotent on their own: they inspect the live schema with
// `PRAGMA table_info` / `PRAGMA index_list` before altering it, so
// databases created by older builds (which never recorded versions) upgrade
// cleanly. A pre-existing `subdomains` table is never trusted to carry the
// `(domain, subdomain)` key; v4 verifies it and adds it when missing.

use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::Error;

struct Migration {
    version: i64,
    name: &'static str,
    apply: fn(&Connection) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_subdomains",
        apply: create_subdomains,
    },
    Migration {
        version: 2,
        name: "add_observation_columns",
        apply: add_observation_columns,
    },
    Migration {
        version: 3,
        name: "create_subdomain_ports",
        apply: create_subdomain_ports,
    },
    Migration {
        version: 4,
        name: "enforce_subdomain_key",
        apply: enforce_subdomain_key,
    },
];

/// Latest schema version known to this build
pub(crate) fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Apply every pending migration. Returns how many ran.
pub(crate) fn run(conn: &mut Connection) -> Result<usize, Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        if is_applied(conn, migration.version)? {
            debug!("Migration {} ({}) already applied", migration.version, migration.name);
            continue;
        }

        let tx = conn.transaction()?;
        (migration.apply)(&tx)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        info!("Applied migration {} ({})", migration.version, migration.name);
        applied += 1;
    }

    Ok(applied)
}

fn is_applied(conn: &Connection, version: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
        params![version],
        |row| row.get(0),
    )
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let columns = rows.collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(columns)
}

/// True when `table` has a full (non-partial) unique index over exactly `columns`
pub(crate) fn has_unique_index(
    conn: &Connection,
    table: &str,
    columns: &[&str],
) -> rusqlite::Result<bool> {
    let indexes = {
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", table))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, bool>(4)?,
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    for (name, unique, partial) in indexes {
        if !unique || partial {
            continue;
        }
        let mut stmt = conn.prepare(&format!("PRAGMA index_info(\"{}\")", name))?;
        let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(2))?;
        let indexed = rows.collect::<rusqlite::Result<Vec<Option<String>>>>()?;

        let matches = indexed.len() == columns.len()
            && columns
                .iter()
                .all(|c| indexed.iter().any(|i| i.as_deref() == Some(*c)));
        if matches {
            return Ok(true);
        }
    }
    Ok(false)
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> rusqlite::Result<()> {
    if table_columns(conn, table)?.iter().any(|c| c == column) {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition),
        [],
    )?;
    Ok(())
}

fn create_subdomains(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS subdomains (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain TEXT NOT NULL,
            subdomain TEXT NOT NULL,
            first_seen_at TEXT NOT NULL,
            UNIQUE(domain, subdomain)
        );

        CREATE INDEX IF NOT EXISTS idx_subdomains_domain
        ON subdomains(domain);",
    )
}

fn add_observation_columns(conn: &Connection) -> rusqlite::Result<()> {
    add_column_if_missing(conn, "subdomains", "last_scanned_at", "TEXT")?;
    add_column_if_missing(conn, "subdomains", "ip_address", "TEXT NOT NULL DEFAULT ''")?;
    add_column_if_missing(conn, "subdomains", "reachable", "TEXT NOT NULL DEFAULT 'unknown'")?;
    Ok(())
}

fn create_subdomain_ports(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS subdomain_ports (
            domain TEXT NOT NULL,
            subdomain TEXT NOT NULL,
            port INTEGER NOT NULL,
            service_name TEXT NOT NULL DEFAULT 'unknown',
            product TEXT NOT NULL DEFAULT '',
            version TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (domain, subdomain, port)
        );",
    )
}

fn enforce_subdomain_key(conn: &Connection) -> rusqlite::Result<()> {
    let columns = table_columns(conn, "subdomains")?;
    if !columns.iter().any(|c| c == "first_seen_at") {
        conn.execute("ALTER TABLE subdomains ADD COLUMN first_seen_at TEXT", [])?;
        if columns.iter().any(|c| c == "detected_at") {
            conn.execute(
                "UPDATE subdomains
                 SET first_seen_at = strftime('%Y-%m-%dT%H:%M:%SZ', detected_at)
                 WHERE detected_at IS NOT NULL",
                [],
            )?;
        }
    }

    if has_unique_index(conn, "subdomains", &["domain", "subdomain"])? {
        debug!("subdomains already keyed by (domain, subdomain)");
        return Ok(());
    }

    // Rows without a key can never be addressed again
    let unkeyed = conn.execute(
        "DELETE FROM subdomains WHERE domain IS NULL OR subdomain IS NULL",
        [],
    )?;

    // Keep the earliest sighting of each key
    let duplicates = conn.execute(
        "DELETE FROM subdomains WHERE rowid IN (
            SELECT row_id FROM (
                SELECT rowid AS row_id,
                       ROW_NUMBER() OVER (
                           PARTITION BY domain, subdomain
                           ORDER BY first_seen_at IS NULL, first_seen_at, rowid
                       ) AS rank
                FROM subdomains
            ) WHERE rank > 1
        )",
        [],
    )?;

    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_subdomains_key
         ON subdomains(domain, subdomain);",
    )?;

    info!(
        unkeyed = unkeyed,
        duplicates = duplicates,
        "Added unique (domain, subdomain) key to legacy subdomains table"
    );
    Ok(())
}
