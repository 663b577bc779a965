//! `vsim-types` – shared data model of the vehicle-signal simulation bridge.
//!
//! Every crate in the workspace speaks in these types: the records kept in
//! the history store, the notifications handed to the event sink, the
//! transport envelope and status, and the workspace-wide [`BridgeError`].
//!
//! # Modules
//!
//! - [`uri`] – [`UUri`]: long-form resource addresses of methods and topics.
//! - [`notification`] – [`Notification`]: the structured records delivered to
//!   the UI-facing event sink, one variant per named channel.

pub mod notification;
pub mod uri;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use notification::{Channel, Notification};
pub use uri::UUri;

/// Prefix of every `type_url` produced by [`Envelope::pack`].
pub const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

// ─────────────────────────────────────────────────────────────────────────────
// Counters
// ─────────────────────────────────────────────────────────────────────────────

/// Cumulative RPC traffic counters.
///
/// `success_rpc` never exceeds `total_rpc`; both only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub total_rpc: u64,
    pub success_rpc: u64,
}

impl Counters {
    /// Number of RPCs whose response was classified as a failure.
    pub fn failed_rpc(&self) -> u64 {
        self.total_rpc.saturating_sub(self.success_rpc)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// History records
// ─────────────────────────────────────────────────────────────────────────────

/// One completed request/response pair as kept by the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcExchange {
    /// Value of `total_rpc` right after this exchange was counted.
    pub sequence_number: u64,
    pub method_name: String,
    /// Normalized outbound request.
    pub request: Value,
    /// Normalized response.
    pub response: Value,
    /// Most recent payload published on the bridge when the response arrived.
    pub last_published: Option<Value>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Kind of a pub/sub history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PubSubKind {
    Subscribe,
    Publish,
    #[serde(rename = "OnTopicUpdate")]
    TopicUpdate,
}

/// Outcome attached to a [`PubSubEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    Success,
    Failed,
}

impl EventStatus {
    /// `0` is success, every other status code is a failure.
    pub fn from_code(code: i32) -> Self {
        if code == status_code::OK {
            EventStatus::Success
        } else {
            EventStatus::Failed
        }
    }
}

/// An immutable record of a subscribe attempt, a publish attempt, or an
/// inbound topic update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubSubEvent {
    pub id: Uuid,
    pub kind: PubSubKind,
    pub topic: String,
    pub transport_name: String,
    pub status: EventStatus,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl PubSubEvent {
    /// Build a new event stamped with a fresh id and the current UTC time.
    pub fn new(
        kind: PubSubKind,
        topic: impl Into<String>,
        transport_name: impl Into<String>,
        status: EventStatus,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            topic: topic.into(),
            transport_name: transport_name.into(),
            status,
            payload,
            timestamp: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport primitives
// ─────────────────────────────────────────────────────────────────────────────

/// Numeric status codes reported by transports.
pub mod status_code {
    pub const OK: i32 = 0;
    pub const CANCELLED: i32 = 1;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const DEADLINE_EXCEEDED: i32 = 4;
    pub const NOT_FOUND: i32 = 5;
    pub const UNIMPLEMENTED: i32 = 12;
    pub const INTERNAL: i32 = 13;
    pub const UNAVAILABLE: i32 = 14;
}

/// Status reported by the transport for a publish, a listener registration
/// or a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStatus {
    pub code: i32,
    pub message: String,
}

impl TransportStatus {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The canonical success status.
    pub fn ok() -> Self {
        Self::new(status_code::OK, "OK")
    }

    pub fn is_ok(&self) -> bool {
        self.code == status_code::OK
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)
    }
}

/// Encoding of the bytes carried by an [`Envelope`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadFormat {
    #[default]
    Json,
    Raw,
}

/// Transport-agnostic wrapper around an encoded message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// `type.googleapis.com/<message type>`, or empty for untyped payloads.
    pub type_url: String,
    pub format: PayloadFormat,
    pub value: Vec<u8>,
}

impl Envelope {
    /// Pack `value` as JSON bytes tagged with `type_name`.
    pub fn pack(type_name: &str, value: &Value) -> Result<Self, BridgeError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| BridgeError::Serialization(e.to_string()))?;
        Ok(Self {
            type_url: format!("{TYPE_URL_PREFIX}{type_name}"),
            format: PayloadFormat::Json,
            value: bytes,
        })
    }

    /// Pack `value` as JSON bytes without a type tag.
    pub fn untyped(value: &Value) -> Result<Self, BridgeError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| BridgeError::Serialization(e.to_string()))?;
        Ok(Self {
            type_url: String::new(),
            format: PayloadFormat::Json,
            value: bytes,
        })
    }

    /// Message type named by `type_url`, if any.
    pub fn type_name(&self) -> Option<&str> {
        if self.type_url.is_empty() {
            return None;
        }
        Some(
            self.type_url
                .strip_prefix(TYPE_URL_PREFIX)
                .unwrap_or(&self.type_url),
        )
    }

    /// Decode the carried bytes as a JSON value tree.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Serialization`] when the payload is not JSON.
    pub fn to_json(&self) -> Result<Value, BridgeError> {
        match self.format {
            PayloadFormat::Json => serde_json::from_slice(&self.value)
                .map_err(|e| BridgeError::Serialization(e.to_string())),
            PayloadFormat::Raw => Err(BridgeError::Serialization(format!(
                "raw payload of {} bytes cannot be read as JSON",
                self.value.len()
            ))),
        }
    }
}

/// A message delivered by the transport to a registered listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UMessage {
    /// Topic the message was published on.
    pub source: UUri,
    pub payload: Envelope,
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests and commands
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments of an RPC dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method_name: String,
    pub service_class: String,
    /// Field paths for a partial update; empty when the whole message applies.
    #[serde(default)]
    pub field_mask: Vec<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Arguments of a publish dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    pub service_class: String,
    #[serde(default)]
    pub payload: Value,
}

/// Commands accepted from the UI side of the bridge (WebSocket clients and
/// the REPL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeCommand {
    SendRpc(RpcRequest),
    Publish(PublishRequest),
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    StartService { entity: String },
    StopService { entity: String },
    RunningServices,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type spanning validation, resolution, lifecycle and
/// transport failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Service already running: {0}")]
    AlreadyRunning(String),

    #[error("Service is not running: {0}")]
    NotRunning(String),

    #[error("Unknown method {method} on service {service}")]
    UnknownMethod { service: String, method: String },

    #[error("No message type mapped for topic {0}")]
    UnknownTopic(String),

    #[error("Invalid URI '{0}'")]
    InvalidUri(String),

    #[error("Message mapping error: {0}")]
    Mapping(String),

    #[error("Transport error ({0})")]
    Transport(TransportStatus),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("History archive error: {0}")]
    Archive(String),
}

impl From<TransportStatus> for BridgeError {
    fn from(status: TransportStatus) -> Self {
        BridgeError::Transport(status)
    }
}

/// Render `err` followed by every error in its `source()` chain, one per
/// line.  Used as the diagnostic trace carried by exception notifications.
pub fn diagnostic_trace(err: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        trace.push_str("\ncaused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_rpc_is_total_minus_success() {
        let counters = Counters {
            total_rpc: 7,
            success_rpc: 5,
        };
        assert_eq!(counters.failed_rpc(), 2);
        assert_eq!(Counters::default().failed_rpc(), 0);
    }

    #[test]
    fn event_status_from_code() {
        assert_eq!(EventStatus::from_code(0), EventStatus::Success);
        assert_eq!(EventStatus::from_code(5), EventStatus::Failed);
        assert_eq!(EventStatus::from_code(-1), EventStatus::Failed);
    }

    #[test]
    fn envelope_pack_tags_type_and_decodes() {
        let value = json!({"zone": "driver", "temperature": 21});
        let env = Envelope::pack("example.v1.Zone", &value).unwrap();
        assert_eq!(env.type_url, "type.googleapis.com/example.v1.Zone");
        assert_eq!(env.type_name(), Some("example.v1.Zone"));
        assert_eq!(env.to_json().unwrap(), value);
    }

    #[test]
    fn untyped_envelope_has_no_type_name() {
        let env = Envelope::untyped(&json!({"a": 1})).unwrap();
        assert_eq!(env.type_name(), None);
    }

    #[test]
    fn raw_envelope_cannot_be_read_as_json() {
        let env = Envelope {
            type_url: String::new(),
            format: PayloadFormat::Raw,
            value: vec![1, 2, 3],
        };
        assert!(matches!(env.to_json(), Err(BridgeError::Serialization(_))));
    }

    #[test]
    fn bridge_command_is_tagged_by_op() {
        let raw = r#"{"op":"send_rpc","method_name":"SayHello","service_class":"example.hello_world","payload":{"name":"vsim"}}"#;
        let cmd: BridgeCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            BridgeCommand::SendRpc(req) => {
                assert_eq!(req.method_name, "SayHello");
                assert!(req.field_mask.is_empty());
                assert_eq!(req.payload, json!({"name": "vsim"}));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cmd: BridgeCommand = serde_json::from_str(r#"{"op":"running_services"}"#).unwrap();
        assert_eq!(cmd, BridgeCommand::RunningServices);
    }

    #[test]
    fn topic_update_kind_serializes_with_original_name() {
        let json = serde_json::to_string(&PubSubKind::TopicUpdate).unwrap();
        assert_eq!(json, "\"OnTopicUpdate\"");
    }

    #[test]
    fn bridge_error_display() {
        let err = BridgeError::UnknownMethod {
            service: "body.horn".to_string(),
            method: "Honk".to_string(),
        };
        assert!(err.to_string().contains("Honk"));
        let err: BridgeError = TransportStatus::new(status_code::NOT_FOUND, "no route").into();
        assert!(err.to_string().contains("no route"));
    }

    #[test]
    fn diagnostic_trace_walks_source_chain() {
        #[derive(Error, Debug)]
        #[error("outer failure")]
        struct Outer(#[source] BridgeError);

        let err = Outer(BridgeError::Mapping("bad field".to_string()));
        let trace = diagnostic_trace(&err);
        assert!(trace.starts_with("outer failure"));
        assert!(trace.contains("caused by: Message mapping error: bad field"));
    }
}
