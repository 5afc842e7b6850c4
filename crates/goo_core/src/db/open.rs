//! Connection bootstrap from a database URL.
//!
//! # Responsibility
//! - Map a database URL onto an in-memory or file SQLite target.
//! - Open the connection and apply the pragmas core behavior relies on.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a 5 s busy timeout.
//! - Only SQLite URLs and plain paths are accepted.

use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const SQLITE_PREFIX: &str = "sqlite://";
const MEMORY_ALIASES: &[&str] = &[":memory:", "sqlite://", "sqlite::memory:", "sqlite:///:memory:"];

/// Where a database URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Memory,
    File(PathBuf),
}

impl ConnectionTarget {
    fn mode(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
        }
    }
}

/// Parses `:memory:`, `sqlite://`, `sqlite::memory:`, `sqlite:///<path>` or a
/// plain filesystem path.
///
/// `sqlite:///data.db` is relative; `sqlite:////var/data.db` is absolute.
pub fn parse_url(url: &str) -> DbResult<ConnectionTarget> {
    let url = url.trim();
    if url.is_empty() {
        return Err(DbError::InvalidUrl(url.to_string()));
    }
    if MEMORY_ALIASES.contains(&url) {
        return Ok(ConnectionTarget::Memory);
    }

    if let Some(rest) = url.strip_prefix(SQLITE_PREFIX) {
        // `sqlite://host/...` has no meaning for an embedded database.
        let path = rest
            .strip_prefix('/')
            .filter(|path| !path.is_empty())
            .ok_or_else(|| DbError::InvalidUrl(url.to_string()))?;
        return Ok(ConnectionTarget::File(PathBuf::from(path)));
    }

    if let Some((scheme, _)) = url.split_once("://") {
        return Err(DbError::UnsupportedScheme(scheme.to_string()));
    }

    Ok(ConnectionTarget::File(PathBuf::from(url)))
}

/// Opens the SQLite database a URL points at.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub(crate) fn open_url(url: &str) -> DbResult<Connection> {
    let started_at = Instant::now();
    let target = match parse_url(url) {
        Ok(target) => target,
        Err(err) => {
            error!(
                "event=db_open module=db status=error error_code=db_url_invalid error={}",
                err
            );
            return Err(err);
        }
    };
    let mode = target.mode();
    info!("event=db_open module=db status=start mode={mode}");

    let opened = match &target {
        ConnectionTarget::Memory => Connection::open_in_memory(),
        ConnectionTarget::File(path) => Connection::open(path),
    };
    let conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{open_url, parse_url, ConnectionTarget};
    use crate::db::DbError;
    use std::path::PathBuf;

    #[test]
    fn memory_aliases_parse_to_memory() {
        for url in [":memory:", "sqlite://", "sqlite::memory:", " sqlite:///:memory: "] {
            assert_eq!(parse_url(url).unwrap(), ConnectionTarget::Memory, "url={url}");
        }
    }

    #[test]
    fn sqlite_urls_keep_relative_and_absolute_paths() {
        assert_eq!(
            parse_url("sqlite:///data/goo.db").unwrap(),
            ConnectionTarget::File(PathBuf::from("data/goo.db"))
        );
        assert_eq!(
            parse_url("sqlite:////var/lib/goo.db").unwrap(),
            ConnectionTarget::File(PathBuf::from("/var/lib/goo.db"))
        );
        assert_eq!(
            parse_url("/tmp/goo.sqlite3").unwrap(),
            ConnectionTarget::File(PathBuf::from("/tmp/goo.sqlite3"))
        );
    }

    #[test]
    fn rejects_empty_hosted_and_foreign_urls() {
        assert!(matches!(parse_url("  "), Err(DbError::InvalidUrl(_))));
        assert!(matches!(
            parse_url("sqlite://remote/db"),
            Err(DbError::InvalidUrl(_))
        ));
        match parse_url("postgresql://user@localhost/goo") {
            Err(DbError::UnsupportedScheme(scheme)) => assert_eq!(scheme, "postgresql"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn open_url_enables_foreign_keys() {
        let conn = open_url(":memory:").unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
