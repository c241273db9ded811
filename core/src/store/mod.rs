//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Engine operations call store methods; they never execute SQL directly.

use crate::{error::TargetResult, event::EventLogEntry};
mod directory;
mod target;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::time::Duration;

pub use target::TargetFilter;

pub struct TargetStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl TargetStore {
    pub fn open(path: &str) -> TargetResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> TargetResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> TargetResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// How long a writer waits for another connection's transaction to finish.
    pub fn set_busy_timeout(&self, timeout: Duration) -> TargetResult<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> TargetResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_directory.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_targets.sql"))?;
        Ok(())
    }

    // ── Transactions ───────────────────────────────────────────

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so writers on other connections are
    /// serialized for the whole read-delete-insert sequence. Commits when `f`
    /// returns `Ok`; any error drops the transaction, which rolls it back.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> TargetResult<T>) -> TargetResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> TargetResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (operation_id, event_type, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.operation_id,
                entry.event_type,
                entry.payload,
                entry.recorded_at,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_operation(&self, operation_id: &str) -> TargetResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, operation_id, event_type, payload, recorded_at
             FROM event_log WHERE operation_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![operation_id], map_event_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Most recent events first.
    pub fn recent_events(&self, limit: usize) -> TargetResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, operation_id, event_type, payload, recorded_at
             FROM event_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], map_event_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> TargetResult<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(n)
    }
}

fn map_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventLogEntry> {
    Ok(EventLogEntry {
        id: Some(row.get(0)?),
        operation_id: row.get(1)?,
        event_type: row.get(2)?,
        payload: row.get(3)?,
        recorded_at: row.get(4)?,
    })
}
