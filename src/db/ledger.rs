//! Reserved-funds ledger
//!
//! Keeps the running total of quote currency committed to open BUY legs,
//! plus the per-bracket amounts that make up that total. Every
//! read-modify-write runs inside one SQLite transaction.

use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use super::Database;
use crate::error::{TradingError, TradingResult};
use crate::types::PriceLevel;

/// Funds recorded against one submitted bracket
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub bracket_id: String,
    pub level: PriceLevel,
    pub amount: Decimal,
    pub created_at: String,
}

/// Persistence seam for the reserved-funds figure.
pub trait Ledger {
    fn read_reserved(&self) -> TradingResult<Decimal>;

    fn write_reserved(&self, amount: Decimal) -> TradingResult<()>;

    /// Add `amount` to the total and remember it for `bracket_id`.
    /// Returns the new total.
    fn record_reservation(&self, bracket_id: &str, level: PriceLevel, amount: Decimal) -> TradingResult<Decimal>;

    /// Forget the reservation of `bracket_id` and subtract it from the
    /// total, never going below zero. `None` if nothing was recorded.
    fn release_reservation(&self, bracket_id: &str) -> TradingResult<Option<Decimal>>;

    fn reservations(&self) -> TradingResult<Vec<Reservation>>;
}

fn parse_amount(raw: &str) -> TradingResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| TradingError::Ledger(format!("corrupt amount '{}': {}", raw, e)))
}

fn read_total(conn: &Connection) -> TradingResult<Decimal> {
    let raw: Option<String> = conn
        .query_row("SELECT reserved FROM ledger WHERE id = 1", [], |row| row.get(0))
        .optional()?;
    match raw {
        Some(raw) => parse_amount(&raw),
        None => Ok(Decimal::ZERO),
    }
}

fn write_total(conn: &Connection, amount: Decimal) -> TradingResult<()> {
    conn.execute(
        "INSERT INTO ledger (id, reserved, updated_at) VALUES (1, ?1, CURRENT_TIMESTAMP)
         ON CONFLICT(id) DO UPDATE SET reserved = excluded.reserved, updated_at = CURRENT_TIMESTAMP",
        params![amount.normalize().to_string()],
    )?;
    Ok(())
}

/// SQLite implementation of [`Ledger`]
#[derive(Clone)]
pub struct SqliteLedger {
    db: Database,
}

impl SqliteLedger {
    /// Wrap a database, running migrations first
    pub fn new(db: Database) -> TradingResult<Self> {
        db.run_migrations()?;
        Ok(Self { db })
    }

    pub fn in_memory() -> TradingResult<Self> {
        Self::new(Database::new_in_memory()?)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Zero the total and drop every per-bracket reservation
    pub fn reset(&self) -> TradingResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM reservations", [])?;
        write_total(&tx, Decimal::ZERO)?;
        tx.commit()?;
        Ok(())
    }
}

impl Ledger for SqliteLedger {
    fn read_reserved(&self) -> TradingResult<Decimal> {
        let conn = self.db.lock()?;
        read_total(&conn)
    }

    fn write_reserved(&self, amount: Decimal) -> TradingResult<()> {
        if amount < Decimal::ZERO {
            return Err(TradingError::Ledger(format!("reserved amount cannot be negative: {}", amount)));
        }
        let conn = self.db.lock()?;
        write_total(&conn, amount)
    }

    fn record_reservation(&self, bracket_id: &str, level: PriceLevel, amount: Decimal) -> TradingResult<Decimal> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT amount FROM reservations WHERE bracket_id = ?1",
                params![bracket_id],
                |row| row.get(0),
            )
            .optional()?;
        let previous = previous.as_deref().map(parse_amount).transpose()?.unwrap_or(Decimal::ZERO);

        tx.execute(
            "INSERT INTO reservations (bracket_id, level, amount) VALUES (?1, ?2, ?3)
             ON CONFLICT(bracket_id) DO UPDATE SET level = excluded.level, amount = excluded.amount",
            params![bracket_id, level, amount.normalize().to_string()],
        )?;

        let total = read_total(&tx)? - previous + amount;
        write_total(&tx, total)?;
        tx.commit()?;
        Ok(total)
    }

    fn release_reservation(&self, bracket_id: &str) -> TradingResult<Option<Decimal>> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let amount: Option<String> = tx
            .query_row(
                "SELECT amount FROM reservations WHERE bracket_id = ?1",
                params![bracket_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(amount) = amount else {
            return Ok(None);
        };
        let amount = parse_amount(&amount)?;

        tx.execute("DELETE FROM reservations WHERE bracket_id = ?1", params![bracket_id])?;
        let total = (read_total(&tx)? - amount).max(Decimal::ZERO);
        write_total(&tx, total)?;
        tx.commit()?;
        Ok(Some(amount))
    }

    fn reservations(&self) -> TradingResult<Vec<Reservation>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT bracket_id, level, amount, created_at FROM reservations ORDER BY level ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut reservations = Vec::new();
        for row in rows {
            let (bracket_id, level, amount, created_at) = row?;
            reservations.push(Reservation {
                bracket_id,
                level,
                amount: parse_amount(&amount)?,
                created_at,
            });
        }
        Ok(reservations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fresh_ledger_is_zero() {
        let ledger = SqliteLedger::in_memory().unwrap();
        assert_eq!(ledger.read_reserved().unwrap(), Decimal::ZERO);
        assert!(ledger.reservations().unwrap().is_empty());
    }

    #[test]
    fn test_write_and_read() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.write_reserved(dec!(9009)).unwrap();
        assert_eq!(ledger.read_reserved().unwrap(), dec!(9009));
        assert!(ledger.write_reserved(dec!(-1)).is_err());
    }

    #[test]
    fn test_record_and_release() {
        let ledger = SqliteLedger::in_memory().unwrap();
        assert_eq!(ledger.record_reservation("A", 9_000_000, dec!(9009)).unwrap(), dec!(9009));
        assert_eq!(ledger.record_reservation("B", 9_200_000, dec!(9209)).unwrap(), dec!(18218));

        assert_eq!(ledger.release_reservation("A").unwrap(), Some(dec!(9009)));
        assert_eq!(ledger.read_reserved().unwrap(), dec!(9209));
        assert_eq!(ledger.release_reservation("A").unwrap(), None);
        assert_eq!(ledger.reservations().unwrap().len(), 1);
    }

    #[test]
    fn test_re_recording_same_bracket_replaces_amount() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.record_reservation("A", 9_000_000, dec!(9009)).unwrap();
        let total = ledger.record_reservation("A", 9_000_000, dec!(9000)).unwrap();
        assert_eq!(total, dec!(9000));
    }

    #[test]
    fn test_release_never_goes_negative() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.record_reservation("A", 9_000_000, dec!(9009)).unwrap();
        ledger.write_reserved(dec!(100)).unwrap();
        ledger.release_reservation("A").unwrap();
        assert_eq!(ledger.read_reserved().unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_reset() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.record_reservation("A", 9_000_000, dec!(9009)).unwrap();
        ledger.reset().unwrap();
        assert_eq!(ledger.read_reserved().unwrap(), Decimal::ZERO);
        assert!(ledger.reservations().unwrap().is_empty());
    }
}
