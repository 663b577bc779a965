//! Publish/subscribe dispatch.
//!
//! [`PubSubDispatcher`] publishes through running mock services and
//! registers topic subscriptions on the transport.  Every subscription shares
//! one [`SubscriptionListener`], which turns inbound topic messages into
//! `topic-update` notifications.
//!
//! # Notifications
//!
//! | Operation | Outcome | Channel |
//! |---|---|---|
//! | `publish` | status `0` | `publish-success` |
//! | `publish` | non-zero status | `publish-failed` |
//! | `publish` | service error | `publish-exception` |
//! | `publish` | service not running | `generic-error` |
//! | `subscribe` | status `0` | `subscribe-success` |
//! | `subscribe` | non-zero status | `subscribe-failed` |
//! | `subscribe` | malformed topic | `subscribe-exception` |
//! | any | precondition failed | `generic-error` |
//! | inbound message | decoded | `topic-update` (after the pacing delay) |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument};
use vsim_memory::HistoryStore;
use vsim_middleware::{EventSink, MessageListener, TransportGateway};
use vsim_services::ServiceRegistry;
use vsim_types::{
    BridgeError, Envelope, EventStatus, Notification, PubSubEvent, PubSubKind, PublishRequest,
    TransportStatus, UMessage, UUri, diagnostic_trace, uri::SCHEME_PREFIX,
};

use crate::normalize::flatten;
use crate::preconditions::PreconditionGate;
use crate::schema::SchemaResolver;

/// Shown when publishing through a service that has not been started.
pub const SERVICE_NOT_RUNNING: &str = "Service is not running. Please start mock service.";

/// Default delay between recording a topic update and announcing it.
pub const DEFAULT_TOPIC_PACING: Duration = Duration::from_millis(500);

fn is_zenoh(transport_name: &str) -> bool {
    transport_name.eq_ignore_ascii_case("zenoh")
}

fn success_message(action: &str, topic: &str, transport_name: &str) -> String {
    let mut message = format!("{action} {topic}");
    if is_zenoh(transport_name) {
        message.push_str(" to ZENOH");
    }
    message
}

fn failure_message(action: &str, topic: &str, status: &TransportStatus) -> String {
    format!(
        "Unsuccessful {action} for {topic} as the status code is {} with status message {}",
        status.code, status.message
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// SubscriptionListener
// ─────────────────────────────────────────────────────────────────────────────

/// The one listener registered for every subscribed topic.
pub struct SubscriptionListener {
    schema: Arc<dyn SchemaResolver>,
    history: Arc<HistoryStore>,
    sink: Arc<dyn EventSink>,
    transport_name: String,
    pacing: Duration,
}

impl SubscriptionListener {
    pub fn new(
        schema: Arc<dyn SchemaResolver>,
        history: Arc<HistoryStore>,
        sink: Arc<dyn EventSink>,
        transport_name: impl Into<String>,
        pacing: Duration,
    ) -> Self {
        Self {
            schema,
            history,
            sink,
            transport_name: transport_name.into(),
            pacing,
        }
    }

    /// Decode, record and announce one inbound message on `topic`.
    ///
    /// Failures are logged and swallowed so the listener keeps serving.
    pub async fn on_topic_update(&self, topic: &UUri, payload: &Envelope) {
        let topic = format!("{SCHEME_PREFIX}{topic}");
        let nested = match self.decode(&topic, payload) {
            Ok(nested) => nested,
            Err(e) => {
                error!(%topic, error = %e, "dropping undecodable topic update");
                return;
            }
        };
        let flat = flatten(&nested);

        self.history.record_pubsub(PubSubEvent::new(
            PubSubKind::TopicUpdate,
            topic.clone(),
            self.transport_name.clone(),
            EventStatus::Success,
            nested.clone(),
        ));

        tokio::time::sleep(self.pacing).await;
        debug!(%topic, "announcing topic update");
        self.sink.notify(Notification::TopicUpdate {
            topic,
            json_data: flat,
            original_json_data: nested,
        });
    }

    fn decode(&self, topic: &str, payload: &Envelope) -> Result<Value, BridgeError> {
        let type_name = self
            .schema
            .topic_type(topic)
            .ok_or_else(|| BridgeError::UnknownTopic(topic.to_string()))?;
        self.schema.decode(&type_name, payload)
    }
}

#[async_trait]
impl MessageListener for SubscriptionListener {
    async fn on_receive(&self, message: UMessage) {
        self.on_topic_update(&message.source, &message.payload).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PubSubDispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Publishes through mock services and manages topic subscriptions.
pub struct PubSubDispatcher {
    transport: Arc<dyn TransportGateway>,
    registry: Arc<ServiceRegistry>,
    history: Arc<HistoryStore>,
    sink: Arc<dyn EventSink>,
    gate: Arc<PreconditionGate>,
    listener: Arc<SubscriptionListener>,
}

impl PubSubDispatcher {
    pub fn new(
        transport: Arc<dyn TransportGateway>,
        registry: Arc<ServiceRegistry>,
        history: Arc<HistoryStore>,
        sink: Arc<dyn EventSink>,
        gate: Arc<PreconditionGate>,
        listener: Arc<SubscriptionListener>,
    ) -> Self {
        Self {
            transport,
            registry,
            history,
            sink,
            gate,
            listener,
        }
    }

    fn check_preconditions(&self) -> Result<(), BridgeError> {
        self.gate.verify_preconditions().map_err(|message| {
            self.sink.notify(Notification::generic_error(message.clone()));
            BridgeError::Precondition(message)
        })
    }

    /// Publish `request.payload` on `request.topic` through the running
    /// service `request.service_class`.
    ///
    /// The published message becomes the bridge-wide last published payload
    /// whatever the transport status.
    #[instrument(skip_all, fields(topic = %request.topic, service = %request.service_class))]
    pub async fn publish(&self, request: PublishRequest) -> Result<Arc<PubSubEvent>, BridgeError> {
        self.check_preconditions()?;

        let PublishRequest {
            topic,
            service_class,
            payload,
        } = request;

        let Some(service) = self.registry.get(&service_class).await else {
            self.sink.notify(Notification::generic_error(SERVICE_NOT_RUNNING));
            return Err(BridgeError::NotRunning(service_class));
        };

        let (message, status) = match service.publish(&topic, payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%topic, error = %e, "publish failed");
                self.sink.notify(Notification::PublishException {
                    topic,
                    trace: diagnostic_trace(&e),
                });
                return Err(e);
            }
        };

        let transport_name = self.transport.name();
        let event = self.history.record_pubsub(PubSubEvent::new(
            PubSubKind::Publish,
            topic.clone(),
            transport_name,
            EventStatus::from_code(status.code),
            message.clone(),
        ));

        let notification = if status.is_ok() {
            Notification::PublishSuccess {
                message: success_message("Successfully published message for", &topic, transport_name),
                topic,
                data: message,
            }
        } else {
            Notification::PublishFailed {
                message: failure_message("publish", &topic, &status),
                topic,
                data: message,
            }
        };
        info!(code = status.code, "publish recorded");
        self.sink.notify(notification);
        Ok(event)
    }

    /// Route messages published on `topic` to the shared listener.
    ///
    /// A non-zero registration status is recorded as a failed subscription,
    /// not returned as an error.
    #[instrument(skip(self))]
    pub async fn subscribe(&self, topic: &str) -> Result<Arc<PubSubEvent>, BridgeError> {
        self.check_preconditions()?;

        let uri: UUri = match topic.parse() {
            Ok(uri) => uri,
            Err(e) => {
                error!(error = %e, "cannot subscribe");
                self.sink.notify(Notification::SubscribeException {
                    topic: topic.to_string(),
                    trace: diagnostic_trace(&e),
                });
                return Err(e);
            }
        };

        let listener: Arc<dyn MessageListener> = self.listener.clone();
        let status = match self.transport.register_listener(&uri, listener).await {
            Ok(()) => TransportStatus::ok(),
            Err(status) => status,
        };

        let transport_name = self.transport.name();
        let (message, notification) = if status.is_ok() {
            let message = success_message("Successfully subscribed to", topic, transport_name);
            let notification = Notification::SubscribeSuccess {
                message: message.clone(),
                topic: topic.to_string(),
            };
            (message, notification)
        } else {
            let message = failure_message("subscription", topic, &status);
            let notification = Notification::SubscribeFailed {
                message: message.clone(),
                topic: topic.to_string(),
            };
            (message, notification)
        };

        let event = self.history.record_pubsub(PubSubEvent::new(
            PubSubKind::Subscribe,
            topic,
            transport_name,
            EventStatus::from_code(status.code),
            json!(message),
        ));
        info!(code = status.code, "subscription recorded");
        self.sink.notify(notification);
        Ok(event)
    }

    /// Stop routing `topic` to the shared listener.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), BridgeError> {
        self.check_preconditions()?;

        let uri: UUri = topic.parse()?;
        let listener: Arc<dyn MessageListener> = self.listener.clone();
        self.transport.unregister_listener(&uri, listener).await?;
        info!(%topic, "unsubscribed");
        Ok(())
    }

    pub fn listener(&self) -> &Arc<SubscriptionListener> {
        &self.listener
    }
}
