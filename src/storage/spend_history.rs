//! Committed-spend history.
//!
//! Persists every committed reservation keyed by `(identity, UTC day)` so a
//! restarted process still honors what an identity already spent today.
//! Reservations are deliberately not persisted: a crash abandons them and
//! the in-memory sweep logic starts clean.

use std::path::Path;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};

use crate::error::Result;

/// Schema version recorded in `user_version`.
const SCHEMA_VERSION: i32 = 1;

/// Spend history database access layer.
pub struct SpendHistory {
    conn: Mutex<Connection>,
}

impl SpendHistory {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // WAL applies to file-backed databases only.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS committed_spend (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     identity TEXT NOT NULL,
                     day TEXT NOT NULL,
                     operation_id TEXT NOT NULL,
                     amount_usd REAL NOT NULL,
                     committed_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_spend_identity_day
                     ON committed_spend (identity, day);",
            )?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    /// Record one committed amount.
    pub fn record(
        &self,
        identity: &str,
        day: NaiveDate,
        operation_id: &str,
        amount_usd: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("spend history lock poisoned");
        conn.execute(
            "INSERT INTO committed_spend (identity, day, operation_id, amount_usd, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                identity,
                day.to_string(),
                operation_id,
                amount_usd,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Total committed for an identity on a day.
    pub fn committed_total(&self, identity: &str, day: NaiveDate) -> Result<f64> {
        let conn = self.conn.lock().expect("spend history lock poisoned");
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount_usd), 0.0) FROM committed_spend
             WHERE identity = ?1 AND day = ?2",
            params![identity, day.to_string()],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Number of commit rows for a day across all identities.
    pub fn operations_on(&self, day: NaiveDate) -> Result<u64> {
        let conn = self.conn.lock().expect("spend history lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM committed_spend WHERE day = ?1",
            params![day.to_string()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Delete rows older than `keep_days` days. Returns rows removed.
    pub fn prune(&self, keep_days: u32) -> Result<usize> {
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(i64::from(keep_days));
        let conn = self.conn.lock().expect("spend history lock poisoned");
        let removed = conn.execute(
            "DELETE FROM committed_spend WHERE day < ?1",
            params![cutoff.to_string()],
        )?;
        Ok(removed)
    }
}
