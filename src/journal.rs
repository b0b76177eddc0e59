// 🗄️ Checkpoint journal - SQLite + WAL
//
// Each artist is an independently checkpointed unit of work. After an
// artist's ledger write-back and document render succeed, the result is
// recorded under (period, artist) together with a hash of the inputs it was
// computed from. A re-run skips artists whose inputs are unchanged, so an
// interrupted run resumes where it stopped and a repeated run is a no-op.

use crate::aggregator::ArtistRevenueAggregate;
use crate::error::Result;
use crate::ledger::CostLedgerEntry;
use crate::period::Period;
use crate::settlement::SettlementResult;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub period: String,
    pub artist_key: String,
    pub input_hash: String,
    pub deduction: f64,
    pub remaining: f64,
    pub net_settlement: f64,
    pub run_id: String,
    pub completed_at: String,
}

/// Audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Event {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Hash of everything a settlement is computed from. Deduction and remaining
/// balance are outputs and stay out of it, so writing them back does not
/// invalidate the checkpoint.
pub fn compute_input_hash(entry: &CostLedgerEntry, aggregate: Option<&ArtistRevenueAggregate>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{}",
        entry.artist_key,
        entry.affiliations.raw.trim(),
        entry.rate,
        entry.prior_balance,
        entry.current_accrual
    ));
    if let Some(aggregate) = aggregate {
        for (source, total) in &aggregate.per_source_total {
            hasher.update(format!("|{}={}", source, total));
        }
        hasher.update(format!("|lines={}", aggregate.line_items.len()));
    }
    format!("{:x}", hasher.finalize())
}

pub struct Journal {
    conn: Connection,
}

impl Journal {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::setup(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> Result<Self> {
        // WAL for crash recovery
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                period TEXT NOT NULL,
                mode TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS artist_checkpoints (
                period TEXT NOT NULL,
                artist_key TEXT NOT NULL,
                input_hash TEXT NOT NULL,
                deduction REAL NOT NULL,
                remaining REAL NOT NULL,
                net_settlement REAL NOT NULL,
                result_json TEXT NOT NULL,
                run_id TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (period, artist_key)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                data TEXT NOT NULL,
                actor TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
            [],
        )?;

        Ok(Journal { conn })
    }

    // ========================================================================
    // RUNS
    // ========================================================================

    /// Register a run and return its id
    pub fn start_run(&self, period: Period, mode: &str) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO runs (run_id, period, mode, status, started_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                period.to_string(),
                mode,
                RunStatus::Running.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(run_id)
    }

    pub fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE run_id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), run_id],
        )?;
        Ok(())
    }

    pub fn run_status(&self, run_id: &str) -> Result<Option<String>> {
        let status = self
            .conn
            .query_row(
                "SELECT status FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    // ========================================================================
    // CHECKPOINTS
    // ========================================================================

    /// Record (or replace) the result for one artist of one period
    pub fn record(&self, run_id: &str, result: &SettlementResult, input_hash: &str) -> Result<()> {
        let result_json = serde_json::to_string(result)?;
        self.conn.execute(
            "INSERT INTO artist_checkpoints (
                period, artist_key, input_hash, deduction, remaining, net_settlement,
                result_json, run_id, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(period, artist_key) DO UPDATE SET
                input_hash = excluded.input_hash,
                deduction = excluded.deduction,
                remaining = excluded.remaining,
                net_settlement = excluded.net_settlement,
                result_json = excluded.result_json,
                run_id = excluded.run_id,
                completed_at = excluded.completed_at",
            params![
                result.period.to_string(),
                result.artist_key,
                input_hash,
                result.deduction_applied,
                result.remaining_carry_forward,
                result.net_settlement_amount,
                result_json,
                run_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn checkpoint(&self, period: Period, artist_key: &str) -> Result<Option<Checkpoint>> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT period, artist_key, input_hash, deduction, remaining, net_settlement,
                        run_id, completed_at
                 FROM artist_checkpoints WHERE period = ?1 AND artist_key = ?2",
                params![period.to_string(), artist_key],
                |row| {
                    Ok(Checkpoint {
                        period: row.get(0)?,
                        artist_key: row.get(1)?,
                        input_hash: row.get(2)?,
                        deduction: row.get(3)?,
                        remaining: row.get(4)?,
                        net_settlement: row.get(5)?,
                        run_id: row.get(6)?,
                        completed_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(checkpoint)
    }

    /// True when the artist was completed from exactly these inputs
    pub fn is_done(&self, period: Period, artist_key: &str, input_hash: &str) -> Result<bool> {
        Ok(self
            .checkpoint(period, artist_key)?
            .map(|c| c.input_hash == input_hash)
            .unwrap_or(false))
    }

    /// Net settlement recorded per artist for a period
    pub fn previous_settlements(&self, period: Period) -> Result<BTreeMap<String, f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT artist_key, net_settlement FROM artist_checkpoints WHERE period = ?1",
        )?;
        let rows = stmt.query_map(params![period.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut map = BTreeMap::new();
        for row in rows {
            let (artist, net) = row?;
            map.insert(artist, net);
        }
        Ok(map)
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub fn insert_event(&self, event: &Event) -> Result<()> {
        let data_json = serde_json::to_string(&event.data)?;
        self.conn.execute(
            "INSERT INTO events (event_id, timestamp, event_type, entity_type, entity_id, data, actor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                data_json,
                event.actor,
            ],
        )?;
        Ok(())
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![entity_type, entity_id], |row| {
            let timestamp: String = row.get(1)?;
            let data: String = row.get(5)?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
            let data = serde_json::from_str(&data)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
            Ok(Event {
                event_id: row.get(0)?,
                timestamp,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data,
                actor: row.get(6)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}
