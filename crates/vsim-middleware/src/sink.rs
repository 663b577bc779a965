//! The Event Sink contract – the UI boundary of the bridge.
//!
//! The core hands every [`Notification`] to an [`EventSink`] and never looks
//! at what happens next.  [`EventBus`][crate::bus::EventBus] fans them out to
//! async subscribers; [`MemorySink`] simply buffers them.

use std::sync::{Mutex, PoisonError};

use vsim_types::{Channel, Notification};

/// Notification surface consumed by the UI layer.
///
/// `notify` must not block: it is called from dispatch contexts that may be
/// serving other requests.
pub trait EventSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// An [`EventSink`] that keeps every notification in memory, in arrival
/// order.  Handy for embedding the bridge without a UI and in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    received: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every notification received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Channels of every notification received so far.
    pub fn channels(&self) -> Vec<Channel> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Notification::channel)
            .collect()
    }

    /// Remove and return everything received so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.received.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for MemorySink {
    fn notify(&self, notification: Notification) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_arrival_order() {
        let sink = MemorySink::new();
        sink.notify(Notification::ServiceStarted {
            entity: "body.horn".to_string(),
        });
        sink.notify(Notification::generic_error("boom"));

        assert_eq!(
            sink.channels(),
            vec![Channel::ServiceStarted, Channel::GenericError]
        );
        assert_eq!(sink.take().len(), 2);
        assert!(sink.notifications().is_empty());
    }
}
