//! [`HistoryStore`] – RPC and pub/sub history with the RPC counters.
//!
//! Two categories, two locks:
//!
//! | Category | Guarded state |
//! |---|---|
//! | RPC | [`Counters`] and the ordered `Arc<RpcExchange>` log |
//! | Pub/sub | the ordered `Arc<PubSubEvent>` log and the last published payload |
//!
//! Neither lock is ever taken while holding the other, so RPC completions
//! and topic updates never wait on each other.  Counter increments and the
//! matching append happen in one critical section, which keeps
//! `success_rpc <= total_rpc` and one exchange per counted RPC.
//!
//! An optional pair of [`HistoryArchive`] connections mirrors every append.
//! Each category owns its connection and only touches it under its own lock,
//! so a slow archive write in one category never stalls the other.  Archive
//! failures are logged and never fail the append.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tracing::warn;
use vsim_types::{BridgeError, Counters, PubSubEvent, PubSubKind, RpcExchange};

use crate::archive::HistoryArchive;

/// Fields of an exchange known before it is counted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRpcExchange {
    pub method_name: String,
    pub request: Value,
    pub response: Value,
    pub last_published: Option<Value>,
    pub success: bool,
}

#[derive(Default)]
struct RpcLog {
    counters: Counters,
    exchanges: Vec<Arc<RpcExchange>>,
}

#[derive(Default)]
struct PubSubLog {
    events: Vec<Arc<PubSubEvent>>,
    last_published: Option<Value>,
}

/// Shared history of everything the bridge dispatched or received.
#[derive(Default)]
pub struct HistoryStore {
    rpc: Mutex<RpcLog>,
    pubsub: Mutex<PubSubLog>,
    rpc_archive: Option<Mutex<HistoryArchive>>,
    pubsub_archive: Option<Mutex<HistoryArchive>>,
}

impl HistoryStore {
    /// Create an empty, memory-only store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store mirrored to the SQLite file at `path`.
    ///
    /// Opens one connection per category on the same file.
    pub fn open_archived(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        Self::with_archives(HistoryArchive::open(path)?, HistoryArchive::open(path)?)
    }

    /// Create a store whose RPC log is mirrored to `rpc_archive` and whose
    /// pub/sub log is mirrored to `pubsub_archive`, each seeded with what its
    /// archive already holds.
    ///
    /// Counters resume from the archived exchanges, so sequence numbers keep
    /// growing across restarts.
    pub fn with_archives(
        rpc_archive: HistoryArchive,
        pubsub_archive: HistoryArchive,
    ) -> Result<Self, BridgeError> {
        let exchanges = rpc_archive.load_rpc()?;
        let counters = rpc_archive.counters()?;
        let events = pubsub_archive.load_pubsub()?;

        let last_published = events
            .iter()
            .rev()
            .find(|e| e.kind == PubSubKind::Publish)
            .map(|e| e.payload.clone());

        Ok(Self {
            rpc: Mutex::new(RpcLog {
                counters,
                exchanges: exchanges.into_iter().map(Arc::new).collect(),
            }),
            pubsub: Mutex::new(PubSubLog {
                events: events.into_iter().map(Arc::new).collect(),
                last_published,
            }),
            rpc_archive: Some(Mutex::new(rpc_archive)),
            pubsub_archive: Some(Mutex::new(pubsub_archive)),
        })
    }

    /// Count and append one RPC exchange.
    ///
    /// `then` runs inside the same critical section with the appended exchange
    /// and the counter snapshot taken right after the increment, so whatever
    /// it emits is ordered exactly like the log.  It must not block.
    pub fn record_rpc<F>(&self, new: NewRpcExchange, then: F) -> (Arc<RpcExchange>, Counters)
    where
        F: FnOnce(&Arc<RpcExchange>, Counters),
    {
        let mut log = self.rpc.lock().unwrap_or_else(PoisonError::into_inner);
        log.counters.total_rpc += 1;
        if new.success {
            log.counters.success_rpc += 1;
        }
        let counters = log.counters;

        let exchange = Arc::new(RpcExchange {
            sequence_number: counters.total_rpc,
            method_name: new.method_name,
            request: new.request,
            response: new.response,
            last_published: new.last_published,
            success: new.success,
            timestamp: Utc::now(),
        });
        log.exchanges.push(Arc::clone(&exchange));

        if let Some(archive) = &self.rpc_archive {
            let archive = archive.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = archive.append_rpc(&exchange) {
                warn!(error = %e, sequence_number = exchange.sequence_number, "failed to archive rpc exchange");
            }
        }

        then(&exchange, counters);
        (exchange, counters)
    }

    /// Append a pub/sub event.
    ///
    /// A [`PubSubKind::Publish`] event also becomes the bridge-wide last
    /// published payload, whatever its status.
    pub fn record_pubsub(&self, event: PubSubEvent) -> Arc<PubSubEvent> {
        let event = Arc::new(event);
        let mut log = self.pubsub.lock().unwrap_or_else(PoisonError::into_inner);
        if event.kind == PubSubKind::Publish {
            log.last_published = Some(event.payload.clone());
        }
        log.events.push(Arc::clone(&event));

        if let Some(archive) = &self.pubsub_archive {
            let archive = archive.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = archive.append_pubsub(&event) {
                warn!(error = %e, topic = %event.topic, "failed to archive pub/sub event");
            }
        }
        event
    }

    /// Most recent payload published through the bridge, on any topic.
    pub fn last_published(&self) -> Option<Value> {
        self.pubsub
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_published
            .clone()
    }

    pub fn counters(&self) -> Counters {
        self.rpc.lock().unwrap_or_else(PoisonError::into_inner).counters
    }

    /// Counters and the RPC log, read under the same lock.
    pub fn rpc_snapshot(&self) -> (Counters, Vec<Arc<RpcExchange>>) {
        let log = self.rpc.lock().unwrap_or_else(PoisonError::into_inner);
        (log.counters, log.exchanges.clone())
    }

    pub fn pubsub_history(&self) -> Vec<Arc<PubSubEvent>> {
        self.pubsub
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .clone()
    }

    /// Forget all history and reset the counters, archive included.
    ///
    /// Each category's archive is cleared under that category's lock, so an
    /// append can never land between the memory reset and the archive wipe.
    pub fn clear(&self) {
        {
            let mut log = self.rpc.lock().unwrap_or_else(PoisonError::into_inner);
            *log = RpcLog::default();
            if let Some(archive) = &self.rpc_archive {
                let archive = archive.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = archive.clear_rpc() {
                    warn!(error = %e, "failed to clear rpc archive");
                }
            }
        }

        let mut log = self.pubsub.lock().unwrap_or_else(PoisonError::into_inner);
        *log = PubSubLog::default();
        if let Some(archive) = &self.pubsub_archive {
            let archive = archive.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = archive.clear_pubsub() {
                warn!(error = %e, "failed to clear pub/sub archive");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use vsim_types::EventStatus;

    fn new_exchange(success: bool) -> NewRpcExchange {
        NewRpcExchange {
            method_name: "ActivateHorn".to_string(),
            request: json!({"mode": "short"}),
            response: json!({"code": if success { 0 } else { 5 }}),
            last_published: None,
            success,
        }
    }

    fn publish_event(payload: Value) -> PubSubEvent {
        PubSubEvent::new(
            PubSubKind::Publish,
            "up:/body.horn/1/horn#Status",
            "ZENOH",
            EventStatus::Success,
            payload,
        )
    }

    #[test]
    fn record_rpc_counts_and_sequences() {
        let store = HistoryStore::new();

        let (first, c1) = store.record_rpc(new_exchange(true), |_, _| {});
        let (second, c2) = store.record_rpc(new_exchange(false), |_, _| {});

        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
        assert_eq!(c1, Counters { total_rpc: 1, success_rpc: 1 });
        assert_eq!(c2, Counters { total_rpc: 2, success_rpc: 1 });
        assert_eq!(c2.failed_rpc(), 1);

        let (counters, log) = store.rpc_snapshot();
        assert_eq!(counters, c2);
        assert_eq!(log.len(), 2);
        assert!(Arc::ptr_eq(&log[1], &second));
    }

    #[test]
    fn callback_sees_exchange_and_snapshot() {
        let store = HistoryStore::new();
        let mut seen = None;

        store.record_rpc(new_exchange(true), |exchange, counters| {
            seen = Some((exchange.sequence_number, counters));
        });

        assert_eq!(seen, Some((1, Counters { total_rpc: 1, success_rpc: 1 })));
    }

    #[test]
    fn concurrent_recording_keeps_counters_consistent() {
        let store = Arc::new(HistoryStore::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        store.record_rpc(new_exchange((t + i) % 3 != 0), |_, _| {});
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let (counters, log) = store.rpc_snapshot();
        assert_eq!(counters.total_rpc, 200);
        assert_eq!(log.len(), 200);
        assert!(counters.success_rpc <= counters.total_rpc);
        assert_eq!(
            counters.success_rpc,
            log.iter().filter(|e| e.success).count() as u64
        );
        let mut sequence: Vec<u64> = log.iter().map(|e| e.sequence_number).collect();
        sequence.sort_unstable();
        assert_eq!(sequence, (1..=200).collect::<Vec<_>>());
    }

    #[test]
    fn publish_event_becomes_last_published() {
        let store = HistoryStore::new();
        assert_eq!(store.last_published(), None);

        store.record_pubsub(publish_event(json!({"active": true})));
        store.record_pubsub(PubSubEvent::new(
            PubSubKind::TopicUpdate,
            "up:/body.horn/1/horn#Status",
            "ZENOH",
            EventStatus::Success,
            json!({"active": false}),
        ));

        assert_eq!(store.last_published(), Some(json!({"active": true})));
        assert_eq!(store.pubsub_history().len(), 2);
    }

    #[test]
    fn clear_resets_everything() {
        let store = HistoryStore::new();
        store.record_rpc(new_exchange(true), |_, _| {});
        store.record_pubsub(publish_event(json!({})));

        store.clear();

        assert_eq!(store.counters(), Counters::default());
        assert!(store.rpc_snapshot().1.is_empty());
        assert!(store.pubsub_history().is_empty());
        assert_eq!(store.last_published(), None);
    }

    #[test]
    fn archived_store_resumes_counters_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let store = HistoryStore::open_archived(&path).unwrap();
            store.record_rpc(new_exchange(true), |_, _| {});
            store.record_rpc(new_exchange(false), |_, _| {});
            store.record_pubsub(publish_event(json!({"active": true})));
        }

        let store = HistoryStore::open_archived(&path).unwrap();
        assert_eq!(store.counters(), Counters { total_rpc: 2, success_rpc: 1 });
        assert_eq!(store.last_published(), Some(json!({"active": true})));

        let (next, _) = store.record_rpc(new_exchange(true), |_, _| {});
        assert_eq!(next.sequence_number, 3);
    }

    #[test]
    fn rpc_recording_never_waits_on_a_pubsub_archive_write() {
        let store = Arc::new(
            HistoryStore::with_archives(
                HistoryArchive::open_in_memory().unwrap(),
                HistoryArchive::open_in_memory().unwrap(),
            )
            .unwrap(),
        );

        // Stand in for a pub/sub archive write that is taking its time.
        let pubsub_writer = store
            .pubsub_archive
            .as_ref()
            .unwrap()
            .lock()
            .unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let worker = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let (exchange, _) = store.record_rpc(new_exchange(true), |_, _| {});
                let counters = store.counters();
                done_tx.send((exchange.sequence_number, counters)).unwrap();
            })
        };

        let (sequence_number, counters) = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("record_rpc blocked behind the pub/sub archive");
        assert_eq!(sequence_number, 1);
        assert_eq!(counters, Counters { total_rpc: 1, success_rpc: 1 });

        drop(pubsub_writer);
        worker.join().unwrap();
    }

    #[test]
    fn pubsub_recording_never_waits_on_an_rpc_archive_write() {
        let store = Arc::new(
            HistoryStore::with_archives(
                HistoryArchive::open_in_memory().unwrap(),
                HistoryArchive::open_in_memory().unwrap(),
            )
            .unwrap(),
        );

        let rpc_writer = store.rpc_archive.as_ref().unwrap().lock().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let worker = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.record_pubsub(publish_event(json!({"active": true})));
                done_tx.send(store.last_published()).unwrap();
            })
        };

        let last = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("record_pubsub blocked behind the rpc archive");
        assert_eq!(last, Some(json!({"active": true})));

        drop(rpc_writer);
        worker.join().unwrap();
    }

    #[test]
    fn clear_wipes_the_archive_and_later_records_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let store = HistoryStore::open_archived(&path).unwrap();
            store.record_rpc(new_exchange(true), |_, _| {});
            store.record_pubsub(publish_event(json!({"active": true})));

            store.clear();

            let (after, _) = store.record_rpc(new_exchange(false), |_, _| {});
            assert_eq!(after.sequence_number, 1);
        }

        let store = HistoryStore::open_archived(&path).unwrap();
        assert_eq!(store.counters(), Counters { total_rpc: 1, success_rpc: 0 });
        assert_eq!(store.rpc_snapshot().1.len(), 1);
        assert!(store.pubsub_history().is_empty());
        assert_eq!(store.last_published(), None);
    }

    #[test]
    fn clear_racing_with_recording_keeps_memory_and_archive_in_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let store = Arc::new(HistoryStore::open_archived(&path).unwrap());

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..50 {
                    store.record_rpc(new_exchange(i % 2 == 0), |_, _| {});
                }
            })
        };
        for _ in 0..5 {
            store.clear();
            thread::yield_now();
        }
        writer.join().unwrap();

        let (counters, log) = store.rpc_snapshot();
        drop(store);
        let reopened = HistoryStore::open_archived(&path).unwrap();
        assert_eq!(reopened.counters(), counters);
        assert_eq!(reopened.rpc_snapshot().1.len(), log.len());
    }
}
