//! Tick history database operations

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Result as SqlResult, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Database;
use crate::core::{PlacementOutcome, TickReport};
use crate::error::TradingResult;

/// One persisted reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickRecord {
    pub id: Option<i64>,
    pub tick_id: String,
    pub started_at: String,
    pub live: bool,
    pub market_price: Option<Decimal>,
    pub target_level: Option<i64>,
    /// `placed`, `dry_run`, `skipped:<reason>` or `failed`
    pub placement: String,
    pub detail: Option<String>,
    pub canceled: i64,
    pub errors: i64,
}

impl TickRecord {
    pub fn from_report(report: &TickReport) -> Self {
        let (placement, detail) = match &report.placement {
            PlacementOutcome::Placed { bracket_id, level, .. } => {
                ("placed".to_string(), Some(format!("{} @ {}", bracket_id, level)))
            }
            PlacementOutcome::DryRun { level } => ("dry_run".to_string(), Some(level.to_string())),
            PlacementOutcome::Skipped(reason) => (format!("skipped:{}", reason.as_str()), None),
            PlacementOutcome::Failed(e) => ("failed".to_string(), Some(e.to_string())),
        };

        TickRecord {
            id: None,
            tick_id: report.tick_id.to_string(),
            started_at: report.started_at.to_rfc3339(),
            live: report.live,
            market_price: report.market_price,
            target_level: report.target_level,
            placement,
            detail,
            canceled: report.canceled_count() as i64,
            errors: report.failure_count() as i64,
        }
    }

    /// Parse a row from the database
    fn from_row(row: &Row) -> SqlResult<Self> {
        let market_price: Option<String> = row.get(4)?;
        Ok(TickRecord {
            id: Some(row.get(0)?),
            tick_id: row.get(1)?,
            started_at: row.get(2)?,
            live: row.get::<_, i32>(3)? == 1,
            market_price: market_price.and_then(|p| Decimal::from_str(&p).ok()),
            target_level: row.get(5)?,
            placement: row.get(6)?,
            detail: row.get(7)?,
            canceled: row.get(8)?,
            errors: row.get(9)?,
        })
    }

    pub fn started_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.started_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Insert record into database
    pub fn insert(&self, db: &Database) -> TradingResult<i64> {
        let conn = db.lock()?;
        conn.execute(
            "INSERT INTO tick_history (
                tick_id, started_at, live, market_price, target_level,
                placement, detail, canceled, errors
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                self.tick_id,
                self.started_at,
                if self.live { 1 } else { 0 },
                self.market_price.map(|p| p.to_string()),
                self.target_level,
                self.placement,
                self.detail,
                self.canceled,
                self.errors,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent ticks, newest first
    pub fn recent(db: &Database, limit: usize) -> TradingResult<Vec<Self>> {
        let conn = db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, tick_id, started_at, live, market_price, target_level,
                    placement, detail, canceled, errors
             FROM tick_history ORDER BY id DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit as i64], Self::from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteLedger;

    fn record(placement: &str) -> TickRecord {
        TickRecord {
            id: None,
            tick_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now().to_rfc3339(),
            live: false,
            market_price: Some(Decimal::from(9_050_000)),
            target_level: Some(9_000_000),
            placement: placement.to_string(),
            detail: None,
            canceled: 0,
            errors: 0,
        }
    }

    #[test]
    fn test_insert_and_recent() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let db = ledger.database();

        record("skipped:level_occupied").insert(db).unwrap();
        record("dry_run").insert(db).unwrap();

        let recent = TickRecord::recent(db, 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].placement, "dry_run");
        assert_eq!(recent[1].market_price, Some(Decimal::from(9_050_000)));
        assert!(recent[0].started_at_utc().is_some());

        assert_eq!(TickRecord::recent(db, 1).unwrap().len(), 1);
    }
}
