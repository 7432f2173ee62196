//! Result Store
//!
//! SQLite persistence for finished runs. One row per run with the full JSON
//! result blob, plus flattened daily-summary and fill tables so downstream
//! analysis can query without deserializing whole runs.
//!
//! This stores end-of-run outputs only; live ledger state is never persisted.

use crate::sim::runner::SimResult;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA_VERSION: u32 = 1;

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current: Option<u32> = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match current {
            None => {
                self.conn.execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS runs (
                        run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                        name TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        model TEXT NOT NULL,
                        start_date TEXT NOT NULL,
                        end_date TEXT NOT NULL,
                        initial_capital REAL NOT NULL,
                        final_value REAL NOT NULL,
                        result_blob TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS daily_summaries (
                        run_id INTEGER NOT NULL,
                        date TEXT NOT NULL,
                        capital REAL NOT NULL,
                        pos_value REAL NOT NULL,
                        value REAL NOT NULL,
                        exe_qty REAL NOT NULL,
                        exe_value REAL NOT NULL,
                        net_cost REAL NOT NULL,
                        pos_cost REAL NOT NULL,
                        realized_pnl REAL NOT NULL,
                        fees REAL NOT NULL,
                        mark_pnl REAL NOT NULL,
                        unrealized_pnl REAL NOT NULL,
                        PRIMARY KEY (run_id, date)
                    );

                    CREATE TABLE IF NOT EXISTS fills (
                        run_id INTEGER NOT NULL,
                        cid INTEGER NOT NULL,
                        date TEXT,
                        pos REAL NOT NULL,
                        qty REAL NOT NULL,
                        bid_price REAL NOT NULL,
                        ask_price REAL NOT NULL,
                        cost REAL NOT NULL,
                        exe_value REAL NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_fills_run ON fills(run_id, date);
                    "#,
                )?;
                self.conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    [SCHEMA_VERSION],
                )?;
                info!("created result store schema v{}", SCHEMA_VERSION);
            }
            Some(v) if v == SCHEMA_VERSION => {
                debug!("result store schema at v{}", SCHEMA_VERSION);
            }
            Some(v) => {
                return Err(StoreError::SchemaVersion {
                    expected: SCHEMA_VERSION,
                    found: v,
                });
            }
        }

        Ok(())
    }

    /// Persist a finished run. Returns the assigned run id.
    pub fn save_run(&mut self, name: &str, result: &SimResult) -> Result<i64, StoreError> {
        let blob = serde_json::to_string(result)?;
        let created_at = chrono::Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO runs (name, created_at, model, start_date, end_date,
                               initial_capital, final_value, result_blob)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                name,
                created_at,
                result.model,
                result.start_date.to_string(),
                result.end_date.to_string(),
                result.initial_capital,
                result.final_value(),
                blob,
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        for day in &result.days {
            let s = &day.book;
            tx.execute(
                "INSERT INTO daily_summaries (run_id, date, capital, pos_value, value,
                     exe_qty, exe_value, net_cost, pos_cost, realized_pnl, fees,
                     mark_pnl, unrealized_pnl)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    run_id,
                    day.date.to_string(),
                    s.capital,
                    s.pos_value,
                    s.value,
                    s.exe_qty,
                    s.exe_value,
                    s.net_cost,
                    s.pos_cost,
                    s.realized_pnl,
                    s.fees,
                    s.mark_pnl,
                    s.unrealized_pnl,
                ],
            )?;
        }

        for fill in &result.fills {
            tx.execute(
                "INSERT INTO fills (run_id, cid, date, pos, qty, bid_price, ask_price,
                                    cost, exe_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run_id,
                    fill.cid as i64,
                    fill.day.map(|d| d.to_string()),
                    fill.pos,
                    fill.qty,
                    fill.bid_price,
                    fill.ask_price,
                    fill.cost,
                    fill.exe_value,
                ],
            )?;
        }

        tx.commit()?;
        info!(run_id, name, "run persisted");
        Ok(run_id)
    }

    /// Load a run's full result blob.
    pub fn load_run(&self, run_id: i64) -> Result<SimResult, StoreError> {
        let blob: Option<String> = self
            .conn
            .query_row(
                "SELECT result_blob FROM runs WHERE run_id = ?",
                [run_id],
                |row| row.get(0),
            )
            .optional()?;
        let blob = blob.ok_or(StoreError::RunNotFound { run_id })?;
        Ok(serde_json::from_str(&blob)?)
    }

    pub fn list_runs(&self) -> Result<Vec<RunRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, name, created_at, model, start_date, end_date,
                    initial_capital, final_value
             FROM runs ORDER BY run_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RunRow {
                    run_id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    model: row.get(3)?,
                    start_date: row.get(4)?,
                    end_date: row.get(5)?,
                    initial_capital: row.get(6)?,
                    final_value: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// One row in the runs table.
#[derive(Debug, Clone)]
pub struct RunRow {
    pub run_id: i64,
    pub name: String,
    pub created_at: String,
    pub model: String,
    pub start_date: String,
    pub end_date: String,
    pub initial_capital: f64,
    pub final_value: f64,
}

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    SchemaVersion { expected: u32, found: u32 },
    RunNotFound { run_id: i64 },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite error: {}", e),
            StoreError::Serde(e) => write!(f, "serialization error: {}", e),
            StoreError::SchemaVersion { expected, found } => {
                write!(f, "result store schema v{} but expected v{}", found, expected)
            }
            StoreError::RunNotFound { run_id } => write!(f, "run {} not found", run_id),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            StoreError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e)
    }
}
