//! Broadcast event bus – the default [`EventSink`].
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every notification without any single subscriber
//! blocking the dispatchers.
//!
//! # Lanes
//!
//! Notifications are partitioned into four [`Lane`]s so UI components only
//! receive the traffic they render:
//!
//! | Lane | Channels |
//! |---|---|
//! | [`Lane::Rpc`] | `rpc-sent`, `rpc-response`, `rpc-exception` |
//! | [`Lane::PubSub`] | `publish-*`, `subscribe-*`, `topic-update` |
//! | [`Lane::Lifecycle`] | `service-started`, `service-stopped` |
//! | [`Lane::Errors`] | `generic-error` |
//!
//! Every notification is also delivered on the global channel.

use tokio::sync::broadcast;
use tracing::{debug, warn};
use vsim_types::{BridgeError, Channel, Notification, TransportStatus, status_code};

use crate::sink::EventSink;

/// Default channel capacity (number of buffered notifications before old
/// ones are dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Rpc,
    PubSub,
    Lifecycle,
    Errors,
}

impl Lane {
    /// Lane a notification channel is routed to.
    pub fn of(channel: Channel) -> Self {
        match channel {
            Channel::RpcSent | Channel::RpcResponse | Channel::RpcException => Lane::Rpc,
            Channel::PublishSuccess
            | Channel::PublishFailed
            | Channel::PublishException
            | Channel::SubscribeSuccess
            | Channel::SubscribeFailed
            | Channel::SubscribeException
            | Channel::TopicUpdate => Lane::PubSub,
            Channel::ServiceStarted | Channel::ServiceStopped => Lane::Lifecycle,
            Channel::GenericError => Lane::Errors,
        }
    }
}

/// Shared notification bus. Clone it cheaply – all clones share the same
/// underlying broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
    rpc: broadcast::Sender<Notification>,
    pubsub: broadcast::Sender<Notification>,
    lifecycle: broadcast::Sender<Notification>,
    errors: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (rpc, _) = broadcast::channel(capacity);
        let (pubsub, _) = broadcast::channel(capacity);
        let (lifecycle, _) = broadcast::channel(capacity);
        let (errors, _) = broadcast::channel(capacity);
        Self {
            sender,
            rpc,
            pubsub,
            lifecycle,
            errors,
        }
    }

    /// Publish `notification` on the global channel only.
    ///
    /// Returns the number of receivers handed the notification, or an error
    /// when nobody is listening.
    pub fn publish(&self, notification: Notification) -> Result<usize, BridgeError> {
        self.sender.send(notification).map_err(|_| no_subscribers("global"))
    }

    /// Publish `notification` on one lane only.
    pub fn publish_to(&self, lane: Lane, notification: Notification) -> Result<usize, BridgeError> {
        self.lane_sender(lane)
            .send(notification)
            .map_err(|_| no_subscribers(&format!("{lane:?}")))
    }

    /// Subscribe to every notification.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Subscribe to a single [`Lane`].
    pub fn subscribe_to(&self, lane: Lane) -> LaneReceiver {
        LaneReceiver {
            lane,
            receiver: self.lane_sender(lane).subscribe(),
        }
    }

    /// Subscribe to a single notification [`Channel`].
    pub fn subscribe_channel(&self, channel: Channel) -> ChannelSubscriber {
        ChannelSubscriber {
            channel,
            receiver: self.lane_sender(Lane::of(channel)).subscribe(),
        }
    }

    fn lane_sender(&self, lane: Lane) -> &broadcast::Sender<Notification> {
        match lane {
            Lane::Rpc => &self.rpc,
            Lane::PubSub => &self.pubsub,
            Lane::Lifecycle => &self.lifecycle,
            Lane::Errors => &self.errors,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn notify(&self, notification: Notification) {
        let channel = notification.channel();
        let lane = Lane::of(channel);
        // A notification nobody listens to is dropped, not an error.
        if self.publish_to(lane, notification.clone()).is_err() {
            debug!(%channel, ?lane, "no lane subscribers");
        }
        if self.publish(notification).is_err() {
            debug!(%channel, "no global subscribers");
        }
    }
}

fn no_subscribers(lane: &str) -> BridgeError {
    BridgeError::Transport(TransportStatus::new(
        status_code::UNAVAILABLE,
        format!("no subscribers on {lane} channel"),
    ))
}

// ---------------------------------------------------------------------------
// Lane receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Lane`].
pub struct LaneReceiver {
    lane: Lane,
    receiver: broadcast::Receiver<Notification>,
}

impl LaneReceiver {
    /// Wait for the next notification on this lane.
    ///
    /// `Lagged(n)` means the receiver fell behind and `n` notifications were
    /// dropped; `Closed` means the bus has shut down.
    pub async fn recv(&mut self) -> Result<Notification, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }
}

// ---------------------------------------------------------------------------
// Channel subscriber
// ---------------------------------------------------------------------------

/// A subscriber that only delivers notifications of one [`Channel`].
pub struct ChannelSubscriber {
    channel: Channel,
    receiver: broadcast::Receiver<Notification>,
}

impl ChannelSubscriber {
    /// Wait for the next notification on this subscriber's channel.
    ///
    /// Returns `None` when the bus is closed.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(n) if n.channel() == self.channel => return Some(n),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(channel = %self.channel, lagged_by = n, "ChannelSubscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn started(entity: &str) -> Notification {
        Notification::ServiceStarted {
            entity: entity.to_string(),
        }
    }

    #[tokio::test]
    async fn notify_reaches_global_and_lane_subscribers() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut global = bus.subscribe();
        let mut lifecycle = bus.subscribe_to(Lane::Lifecycle);

        bus.notify(started("body.horn"));

        assert_eq!(global.recv().await?, started("body.horn"));
        assert_eq!(lifecycle.recv().await?, started("body.horn"));
        assert_eq!(lifecycle.lane(), Lane::Lifecycle);
        Ok(())
    }

    #[test]
    fn notify_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.notify(Notification::generic_error("nobody listens"));
    }

    #[test]
    fn publish_without_subscribers_returns_error() {
        let bus = EventBus::default();
        assert!(bus.publish(started("vehicle")).is_err());
        assert!(bus.publish_to(Lane::Lifecycle, started("vehicle")).is_err());
    }

    #[tokio::test]
    async fn lane_subscriber_does_not_receive_other_lanes() {
        let bus = EventBus::default();
        let mut errors = bus.subscribe_to(Lane::Errors);

        bus.notify(started("chassis"));

        let result = tokio::time::timeout(Duration::from_millis(50), errors.recv()).await;
        assert!(result.is_err(), "Errors lane must not receive lifecycle traffic");
    }

    #[tokio::test]
    async fn channel_subscriber_filters_within_lane() {
        let bus = EventBus::default();
        let mut stopped = bus.subscribe_channel(Channel::ServiceStopped);

        bus.notify(started("body.mirrors"));
        bus.notify(Notification::ServiceStopped {
            entity: "body.mirrors".to_string(),
        });

        let got = stopped.recv().await.expect("stopped notification");
        assert_eq!(got.channel(), Channel::ServiceStopped);
    }

    #[test]
    fn every_channel_has_a_lane() {
        assert_eq!(Lane::of(Channel::RpcResponse), Lane::Rpc);
        assert_eq!(Lane::of(Channel::TopicUpdate), Lane::PubSub);
        assert_eq!(Lane::of(Channel::SubscribeException), Lane::PubSub);
        assert_eq!(Lane::of(Channel::ServiceStopped), Lane::Lifecycle);
        assert_eq!(Lane::of(Channel::GenericError), Lane::Errors);
    }

    #[tokio::test]
    async fn slow_lane_subscriber_lags() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Lane::Errors);

        for i in 0..1_000 {
            bus.notify(Notification::generic_error(format!("flood {i}")));
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
