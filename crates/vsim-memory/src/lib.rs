//! `vsim-memory` – traffic history and counters.
//!
//! Keeps what the bridge has seen so the UI can render it and the counters
//! stay consistent under concurrent dispatch.
//!
//! # Modules
//!
//! - [`history`] – [`HistoryStore`][history::HistoryStore]: the RPC log with
//!   its counters and the pub/sub log with the last published payload, each
//!   behind its own lock.
//! - [`archive`] – [`HistoryArchive`][archive::HistoryArchive]: optional
//!   SQLite persistence of both logs so history survives a restart.

pub mod archive;
pub mod history;

pub use archive::{ArchiveError, HistoryArchive};
pub use history::{HistoryStore, NewRpcExchange};
