//! Database module for the SQLite-backed ledger and tick history

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{TradingError, TradingResult};

pub mod ledger;
pub mod tick_log;

pub use ledger::{Ledger, Reservation, SqliteLedger};
pub use tick_log::TickRecord;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ledger (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    reserved TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

INSERT OR IGNORE INTO ledger (id, reserved) VALUES (1, '0');

CREATE TABLE IF NOT EXISTS reservations (
    bracket_id TEXT PRIMARY KEY,
    level INTEGER NOT NULL,
    amount TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS tick_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tick_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    live INTEGER NOT NULL,
    market_price TEXT,
    target_level INTEGER,
    placement TEXT NOT NULL,
    detail TEXT,
    canceled INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_tick_history_started ON tick_history(started_at);
";

/// Shared SQLite connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file, creating its parent directory.
    pub fn new<P: AsRef<Path>>(path: P) -> TradingResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory database (for testing and dry runs)
    pub fn new_in_memory() -> TradingResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Database {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Create tables if missing and seed the ledger row
    pub fn run_migrations(&self) -> TradingResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> TradingResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TradingError::Ledger("database connection lock poisoned".to_string()))
    }

    /// Check database health
    pub fn health_check(&self) -> TradingResult<bool> {
        let conn = self.lock()?;
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(result == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_creation() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.health_check().unwrap());
    }

    #[test]
    fn test_migrations_are_repeatable() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();
        db.run_migrations().unwrap();

        let conn = db.lock().unwrap();
        let tables: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('ledger', 'reservations', 'tick_history')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);

        let rows: i32 = conn.query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0)).unwrap();
        assert_eq!(rows, 1);
    }
}
