//! SQLite history archive.
//!
//! Persists every [`RpcExchange`] and [`PubSubEvent`] appended to the
//! history store so a restarted bridge can show what happened before.
//!
//! # Storage layout
//!
//! Two tables are created (if they do not already exist).  The full record is
//! kept as JSON; the other columns exist for ordering and ad-hoc queries.
//!
//! | table | columns |
//! |---|---|
//! | `rpc_exchanges` | `sequence_number` (PK), `timestamp`, `method_name`, `success`, `record` |
//! | `pubsub_events` | `seq` (PK, autoincrement), `id` (unique), `timestamp`, `kind`, `topic`, `status`, `record` |
//!
//! File databases run in WAL mode, so one connection per table can write
//! without waiting on a connection writing the other.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use vsim_memory::HistoryArchive;
//! use vsim_types::{EventStatus, PubSubEvent, PubSubKind};
//!
//! let archive = HistoryArchive::open_in_memory().unwrap();
//! let event = PubSubEvent::new(
//!     PubSubKind::Publish,
//!     "up:/body.horn/1/horn#Status",
//!     "ZENOH",
//!     EventStatus::Success,
//!     json!({"active": true}),
//! );
//! archive.append_pubsub(&event).unwrap();
//! assert_eq!(archive.load_pubsub().unwrap(), vec![event]);
//! ```

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, params};
use thiserror::Error;
use vsim_types::{BridgeError, Counters, PubSubEvent, RpcExchange};

/// Errors that can arise from archive operations.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Record encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ArchiveError> for BridgeError {
    fn from(err: ArchiveError) -> Self {
        BridgeError::Archive(err.to_string())
    }
}

/// How long a write waits for another connection's transaction to commit.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store of past traffic.
pub struct HistoryArchive {
    conn: Connection,
}

impl HistoryArchive {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        let archive = Self { conn };
        archive.init_schema()?;
        Ok(archive)
    }

    /// Open a temporary in-memory database.
    pub fn open_in_memory() -> Result<Self, ArchiveError> {
        let conn = Connection::open_in_memory()?;
        let archive = Self { conn };
        archive.init_schema()?;
        Ok(archive)
    }

    fn init_schema(&self) -> Result<(), ArchiveError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rpc_exchanges (
                sequence_number INTEGER NOT NULL PRIMARY KEY,
                timestamp       TEXT NOT NULL,
                method_name     TEXT NOT NULL,
                success         INTEGER NOT NULL,
                record          TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pubsub_events (
                seq       INTEGER PRIMARY KEY AUTOINCREMENT,
                id        TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                kind      TEXT NOT NULL,
                topic     TEXT NOT NULL,
                status    TEXT NOT NULL,
                record    TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Persist one RPC exchange.
    pub fn append_rpc(&self, exchange: &RpcExchange) -> Result<(), ArchiveError> {
        let record = serde_json::to_string(exchange)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO rpc_exchanges
                 (sequence_number, timestamp, method_name, success, record)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                exchange.sequence_number as i64,
                exchange.timestamp.to_rfc3339(),
                exchange.method_name,
                exchange.success,
                record,
            ],
        )?;
        Ok(())
    }

    /// Persist one pub/sub event.
    pub fn append_pubsub(&self, event: &PubSubEvent) -> Result<(), ArchiveError> {
        let record = serde_json::to_string(event)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO pubsub_events
                 (id, timestamp, kind, topic, status, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id.to_string(),
                event.timestamp.to_rfc3339(),
                format!("{:?}", event.kind),
                event.topic,
                format!("{:?}", event.status),
                record,
            ],
        )?;
        Ok(())
    }

    /// Every archived RPC exchange in sequence order.
    pub fn load_rpc(&self) -> Result<Vec<RpcExchange>, ArchiveError> {
        self.load_records("SELECT record FROM rpc_exchanges ORDER BY sequence_number ASC")
    }

    /// Every archived pub/sub event in insertion order.
    pub fn load_pubsub(&self) -> Result<Vec<PubSubEvent>, ArchiveError> {
        self.load_records("SELECT record FROM pubsub_events ORDER BY seq ASC")
    }

    /// Counters as implied by the archived exchanges.
    pub fn counters(&self) -> Result<Counters, ArchiveError> {
        let (total, success): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(success), 0) FROM rpc_exchanges",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(Counters {
            total_rpc: total.max(0) as u64,
            success_rpc: success.max(0) as u64,
        })
    }

    /// Delete every archived RPC exchange.
    pub fn clear_rpc(&self) -> Result<(), ArchiveError> {
        self.conn.execute("DELETE FROM rpc_exchanges", [])?;
        Ok(())
    }

    /// Delete every archived pub/sub event.
    pub fn clear_pubsub(&self) -> Result<(), ArchiveError> {
        self.conn.execute("DELETE FROM pubsub_events", [])?;
        Ok(())
    }

    fn load_records<T: serde::de::DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>, ArchiveError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }
}
