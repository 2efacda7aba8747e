pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use rusqlite::{Connection, Transaction};

/// The document store. One connection behind a mutex: every call is
/// serialized, and `with_tx` gives a handler an atomic read-then-write.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers from other processes (backups, sqlite3 shell)
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run read-only work against the connection.
    pub fn with_conn<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run `f` inside a transaction. Commits only when `f` returns `Ok`;
    /// any error rolls back every write `f` made.
    pub fn with_tx<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
        let tx = conn.transaction().map_err(anyhow::Error::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(anyhow::Error::from)?;
        Ok(out)
    }
}

/// True when `err` came from a UNIQUE (or other) constraint rejecting a write.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
    )
}

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("Timestamp out of range: {}", ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_on_disk_runs_migrations_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("city.db");

        drop(Database::open(&path).unwrap());
        // Reopening must not re-apply v1.
        let db = Database::open(&path).unwrap();
        let version: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
                    .map_err(anyhow::Error::from)
            })
            .unwrap();
        assert_eq!(version, migrations::LATEST_VERSION);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();

        let result: Result<()> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES ('u1', 'ann', 'x', 0)",
                [],
            )?;
            Err(anyhow!("abort"))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
                    .map_err(anyhow::Error::from)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn unique_violation_is_detected() {
        let db = Database::open_in_memory().unwrap();
        let insert = |conn: &Connection| -> Result<()> {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (lower(hex(randomblob(8))), 'ann', 'x', 0)",
                [],
            )?;
            Ok(())
        };
        db.with_conn(insert).unwrap();
        let err = db.with_conn(insert).unwrap_err();
        assert!(is_constraint_violation(&err));
        assert!(!is_constraint_violation(&anyhow!("something else")));
    }

    #[test]
    fn millis_round_trip() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(from_millis(to_millis(now)).unwrap(), now);
    }
}
