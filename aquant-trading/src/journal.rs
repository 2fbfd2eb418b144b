//! Signal journal: every emitted decision persisted in SQLite.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::data::exchange_offset;
use crate::strategy::{Action, Decision};

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    action TEXT NOT NULL,
    score REAL NOT NULL,
    position_fraction REAL NOT NULL,
    price REAL NOT NULL,
    vetoes TEXT NOT NULL,
    reasons TEXT NOT NULL,
    triggers TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    trade_date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_decisions_symbol ON decisions(symbol, timestamp);
CREATE INDEX IF NOT EXISTS idx_decisions_date ON decisions(trade_date, action);
"#;

const SELECT_COLUMNS: &str =
    "id, symbol, action, score, position_fraction, price, vetoes, reasons, triggers, timestamp";

/// Decisions per action for one trading day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub buy: usize,
    pub sell: usize,
    pub wait: usize,
}

impl ActionCounts {
    pub fn total(&self) -> usize {
        self.buy + self.sell + self.wait
    }
}

/// SQLite-backed decision log.
pub struct SignalJournal {
    /// rusqlite::Connection is Send but not Sync
    db: Arc<Mutex<Connection>>,
}

impl SignalJournal {
    /// Open (or create) the journal database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path).context("Failed to open signal journal")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create journal tables")?;

        info!(path = %path.display(), "Opened signal journal");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Persist a decision. Re-recording the same id replaces the row.
    pub async fn record(&self, decision: &Decision) -> Result<()> {
        let db = self.db.lock().await;
        let trade_date = decision
            .timestamp
            .with_timezone(&exchange_offset())
            .date_naive();

        db.execute(
            r#"
            INSERT OR REPLACE INTO decisions
            (id, symbol, action, score, position_fraction, price, vetoes, reasons, triggers, timestamp, trade_date)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                decision.id.to_string(),
                decision.symbol,
                decision.action.as_str(),
                decision.score,
                decision.position_fraction,
                decision.price,
                serde_json::to_string(&decision.vetoes)?,
                serde_json::to_string(&decision.reasons)?,
                serde_json::to_string(&decision.triggers)?,
                decision.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                trade_date.to_string(),
            ],
        )
        .context("Failed to record decision")?;

        debug!(id = %decision.id, symbol = %decision.symbol, action = decision.action.as_str(), "Decision journaled");
        Ok(())
    }

    /// Latest decisions, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Decision>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM decisions ORDER BY timestamp DESC LIMIT ?1",
            SELECT_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_decision)?;
        Ok(Self::collect_rows(rows))
    }

    /// Latest decisions for a symbol, newest first.
    pub async fn for_symbol(&self, symbol: &str, limit: usize) -> Result<Vec<Decision>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM decisions WHERE symbol = ?1 ORDER BY timestamp DESC LIMIT ?2",
            SELECT_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![symbol, limit as i64], Self::row_to_decision)?;
        Ok(Self::collect_rows(rows))
    }

    /// Decision counts per action for a trading date.
    pub async fn count_by_action(&self, date: NaiveDate) -> Result<ActionCounts> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT action, COUNT(*) FROM decisions WHERE trade_date = ?1 GROUP BY action",
        )?;
        let rows = stmt.query_map(params![date.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = ActionCounts::default();
        for row in rows {
            let (action, n) = row?;
            let n = n.max(0) as usize;
            match action.parse::<Action>() {
                Ok(Action::Buy) => counts.buy += n,
                Ok(Action::Sell) => counts.sell += n,
                Ok(Action::Wait) => counts.wait += n,
                Err(e) => warn!(error = %e, "Skipping unknown action in journal"),
            }
        }
        Ok(counts)
    }

    fn collect_rows<I>(rows: I) -> Vec<Decision>
    where
        I: Iterator<Item = rusqlite::Result<Decision>>,
    {
        rows.filter_map(|r| match r {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable journal row");
                None
            }
        })
        .collect()
    }

    fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
        let id: String = row.get(0)?;
        let action: String = row.get(2)?;
        let vetoes: String = row.get(6)?;
        let reasons: String = row.get(7)?;
        let triggers: String = row.get(8)?;
        let timestamp: String = row.get(9)?;

        let conversion = |idx: usize, e: Box<dyn std::error::Error + Send + Sync>| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
        };

        Ok(Decision {
            id: Uuid::parse_str(&id).map_err(|e| conversion(0, Box::new(e)))?,
            symbol: row.get(1)?,
            action: action.parse().map_err(|e: String| conversion(2, e.into()))?,
            score: row.get(3)?,
            position_fraction: row.get(4)?,
            price: row.get(5)?,
            vetoes: serde_json::from_str(&vetoes).map_err(|e| conversion(6, Box::new(e)))?,
            reasons: serde_json::from_str(&reasons).map_err(|e| conversion(7, Box::new(e)))?,
            triggers: serde_json::from_str(&triggers).map_err(|e| conversion(8, Box::new(e)))?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| conversion(9, Box::new(e)))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::SignalKind;
    use crate::market::MarketPhase;
    use crate::strategy::Veto;
    use chrono::Duration;
    use tempfile::tempdir;

    fn decision(symbol: &str, action: Action, at: DateTime<Utc>) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            action,
            score: 72.5,
            position_fraction: if action == Action::Buy { 0.15 } else { 0.0 },
            vetoes: if action == Action::Wait {
                vec![Veto::ColdMarket(MarketPhase::Ebb)]
            } else {
                vec![]
            },
            reasons: vec!["半路 80.0".into()],
            triggers: vec![SignalKind::HalfwayBreakout],
            price: 10.5,
            timestamp: at,
        }
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-10T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_record_and_recent() {
        let dir = tempdir().unwrap();
        let journal = SignalJournal::open(&dir.path().join("nested/signals.db")).unwrap();

        let first = decision("600000", Action::Buy, base_time());
        let second = decision("000001", Action::Wait, base_time() + Duration::seconds(10));
        journal.record(&first).await.unwrap();
        journal.record(&second).await.unwrap();

        let recent = journal.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], second);
        assert_eq!(recent[1], first);

        assert_eq!(journal.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_for_symbol_and_counts() {
        let dir = tempdir().unwrap();
        let journal = SignalJournal::open(&dir.path().join("signals.db")).unwrap();

        journal.record(&decision("600000", Action::Buy, base_time())).await.unwrap();
        journal
            .record(&decision("600000", Action::Sell, base_time() + Duration::days(1)))
            .await
            .unwrap();
        journal
            .record(&decision("000001", Action::Wait, base_time() + Duration::seconds(5)))
            .await
            .unwrap();

        let rows = journal.for_symbol("600000", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].action, Action::Sell);

        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let counts = journal.count_by_action(day).await.unwrap();
        assert_eq!(counts, ActionCounts { buy: 1, sell: 0, wait: 1 });
        assert_eq!(counts.total(), 2);
    }

    #[tokio::test]
    async fn test_rerecord_replaces() {
        let dir = tempdir().unwrap();
        let journal = SignalJournal::open(&dir.path().join("signals.db")).unwrap();

        let mut d = decision("600000", Action::Buy, base_time());
        journal.record(&d).await.unwrap();
        d.score = 90.0;
        journal.record(&d).await.unwrap();

        let rows = journal.recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 90.0);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signals.db");
        let d = decision("600000", Action::Buy, base_time());

        {
            let journal = SignalJournal::open(&path).unwrap();
            tokio_test::block_on(journal.record(&d)).unwrap();
        }

        let journal = SignalJournal::open(&path).unwrap();
        let rows = tokio_test::block_on(journal.recent(10)).unwrap();
        assert_eq!(rows, vec![d]);
    }
}
