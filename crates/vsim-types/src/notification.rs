//! [`Notification`] – records delivered to the UI-facing event sink.
//!
//! Each variant travels on exactly one named [`Channel`].  On the wire a
//! notification serializes as `{"channel": "<name>", "payload": {...}}`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Counters, RpcExchange};

/// Named notification channels of the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    RpcSent,
    RpcResponse,
    RpcException,
    PublishSuccess,
    PublishFailed,
    PublishException,
    SubscribeSuccess,
    SubscribeFailed,
    SubscribeException,
    TopicUpdate,
    GenericError,
    ServiceStarted,
    ServiceStopped,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::RpcSent => "rpc-sent",
            Channel::RpcResponse => "rpc-response",
            Channel::RpcException => "rpc-exception",
            Channel::PublishSuccess => "publish-success",
            Channel::PublishFailed => "publish-failed",
            Channel::PublishException => "publish-exception",
            Channel::SubscribeSuccess => "subscribe-success",
            Channel::SubscribeFailed => "subscribe-failed",
            Channel::SubscribeException => "subscribe-exception",
            Channel::TopicUpdate => "topic-update",
            Channel::GenericError => "generic-error",
            Channel::ServiceStarted => "service-started",
            Channel::ServiceStopped => "service-stopped",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured notification for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum Notification {
    /// The request left the bridge; the response is still outstanding.
    RpcSent {
        message: String,
        method_name: String,
        data: Value,
    },
    /// A response was received, classified and recorded.
    RpcResponse {
        exchange: Arc<RpcExchange>,
        counters: Counters,
    },
    RpcException {
        method_name: String,
        trace: String,
    },
    PublishSuccess {
        message: String,
        topic: String,
        data: Value,
    },
    PublishFailed {
        message: String,
        topic: String,
        data: Value,
    },
    PublishException {
        topic: String,
        trace: String,
    },
    SubscribeSuccess {
        message: String,
        topic: String,
    },
    SubscribeFailed {
        message: String,
        topic: String,
    },
    SubscribeException {
        topic: String,
        trace: String,
    },
    /// An inbound message on a subscribed topic, flat and nested.
    TopicUpdate {
        topic: String,
        json_data: Value,
        original_json_data: Value,
    },
    GenericError {
        message: String,
    },
    ServiceStarted {
        entity: String,
    },
    ServiceStopped {
        entity: String,
    },
}

impl Notification {
    /// The channel this notification travels on.
    pub fn channel(&self) -> Channel {
        match self {
            Notification::RpcSent { .. } => Channel::RpcSent,
            Notification::RpcResponse { .. } => Channel::RpcResponse,
            Notification::RpcException { .. } => Channel::RpcException,
            Notification::PublishSuccess { .. } => Channel::PublishSuccess,
            Notification::PublishFailed { .. } => Channel::PublishFailed,
            Notification::PublishException { .. } => Channel::PublishException,
            Notification::SubscribeSuccess { .. } => Channel::SubscribeSuccess,
            Notification::SubscribeFailed { .. } => Channel::SubscribeFailed,
            Notification::SubscribeException { .. } => Channel::SubscribeException,
            Notification::TopicUpdate { .. } => Channel::TopicUpdate,
            Notification::GenericError { .. } => Channel::GenericError,
            Notification::ServiceStarted { .. } => Channel::ServiceStarted,
            Notification::ServiceStopped { .. } => Channel::ServiceStopped,
        }
    }

    pub fn generic_error(message: impl Into<String>) -> Self {
        Notification::GenericError {
            message: message.into(),
        }
    }
}
