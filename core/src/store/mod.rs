//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. Stages call store methods —
//! they never execute SQL directly. Every mutation here is either a single
//! statement (atomic in SQLite) or an explicit transaction scoped to that
//! one operation; there is no transaction spanning stages.

mod curve;
mod scenario;
mod snapshot;

pub use curve::{InterpolatedRow, TermStructureRow};
pub use snapshot::AccountRow;

use crate::{
    error::{EclError, EclResult},
    progress::CheckpointEntry,
    types::RunKey,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

pub struct EclStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl EclStore {
    pub fn open(path: &str) -> EclResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: Some(path.to_string()) })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EclResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EclResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_accounts.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/003_term_structures.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/004_scenarios.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/005_lgd.sql"))?;
        Ok(())
    }

    // ── Run registry ───────────────────────────────────────────

    /// The current (maximum) run key for a calculation date, if any run
    /// has been opened.
    pub fn current_run_key(&self, calc_date: NaiveDate) -> EclResult<Option<RunKey>> {
        let key = self
            .conn
            .query_row(
                "SELECT MAX(run_key) FROM run_registry WHERE calc_date = ?1",
                params![calc_date.to_string()],
                |row| row.get::<_, Option<RunKey>>(0),
            )
            .optional()?
            .flatten();
        Ok(key)
    }

    /// Open the next run for a date: max existing key + 1, starting at 1.
    pub fn open_run(&self, calc_date: NaiveDate, opened_at: &str) -> EclResult<RunKey> {
        self.conn.execute(
            "INSERT INTO run_registry (calc_date, run_key, opened_at)
             SELECT ?1, COALESCE(MAX(run_key), 0) + 1, ?2
               FROM run_registry WHERE calc_date = ?1",
            params![calc_date.to_string(), opened_at],
        )?;
        self.current_run_key(calc_date)?.ok_or_else(|| {
            EclError::validation(format!("run registry empty after open for {calc_date}"))
        })
    }

    // ── Pipeline lease ─────────────────────────────────────────

    /// Acquire the per-date lease. Fails with `LeaseHeld` when another
    /// invocation already holds it.
    pub fn acquire_lease(&self, calc_date: NaiveDate, run_key: RunKey) -> EclResult<()> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO pipeline_lease (calc_date, run_key) VALUES (?1, ?2)",
            params![calc_date.to_string(), run_key],
        )?;
        if changed == 0 {
            return Err(EclError::LeaseHeld { calc_date: calc_date.to_string() });
        }
        Ok(())
    }

    pub fn release_lease(&self, calc_date: NaiveDate) -> EclResult<()> {
        self.conn.execute(
            "DELETE FROM pipeline_lease WHERE calc_date = ?1",
            params![calc_date.to_string()],
        )?;
        Ok(())
    }

    // ── Progress checkpoint ────────────────────────────────────

    pub fn save_checkpoint(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
        entries: &[CheckpointEntry],
    ) -> EclResult<()> {
        let json = serde_json::to_string(entries)?;
        self.conn.execute(
            "INSERT INTO pipeline_checkpoint (calc_date, run_key, entries_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (calc_date) DO UPDATE
                SET run_key = excluded.run_key,
                    entries_json = excluded.entries_json",
            params![calc_date.to_string(), run_key, json],
        )?;
        Ok(())
    }

    pub fn load_checkpoint(
        &self,
        calc_date: NaiveDate,
    ) -> EclResult<Option<Vec<CheckpointEntry>>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT entries_json FROM pipeline_checkpoint WHERE calc_date = ?1",
                params![calc_date.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Reopen a new connection to the same database. In-memory stores get
    /// a fresh, isolated database.
    pub fn reopen(&self) -> EclResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }
}
