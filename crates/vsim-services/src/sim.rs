//! [`SimService`] – generic stateful stand-in for any vehicle subsystem.
//!
//! # Behaviour
//!
//! | Operation | Effect |
//! |---|---|
//! | `start` | Registers an RPC handler for the entity on the transport. |
//! | inbound method call | Merges the request into the service state and answers `{"status": {"code": 0, "message": "OK"}}`. |
//! | `SayHello` | Answers `{"message": "Hello <name>"}`. |
//! | `publish` | Sends the payload on the topic and reports the transport status. |
//! | `disconnect` | Unregisters the RPC handler. |
//!
//! When a request carries `update_mask.paths`, only the named top-level
//! fields are merged; otherwise every field of the request is.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info};
use vsim_middleware::{RpcHandler, TransportGateway};
use vsim_types::{BridgeError, Envelope, TransportStatus, UUri, status_code};

use crate::service::MockService;

const UPDATE_MASK_FIELD: &str = "update_mask";

/// Generic mock service backed by a JSON state object.
pub struct SimService {
    entity: String,
    transport: Arc<dyn TransportGateway>,
    state: Arc<Mutex<Map<String, Value>>>,
}

impl SimService {
    pub fn new(entity: impl Into<String>, transport: Arc<dyn TransportGateway>) -> Self {
        Self {
            entity: entity.into(),
            transport,
            state: Arc::new(Mutex::new(Map::new())),
        }
    }

    /// Copy of the state accumulated from handled requests.
    pub fn state(&self) -> Value {
        Value::Object(self.state.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

#[async_trait]
impl MockService for SimService {
    fn entity(&self) -> &str {
        &self.entity
    }

    async fn start(&self) -> Result<(), BridgeError> {
        let handler = Arc::new(SimRpcHandler {
            entity: self.entity.clone(),
            state: Arc::clone(&self.state),
        });
        self.transport.register_rpc_handler(&self.entity, handler).await?;
        info!(entity = %self.entity, transport = self.transport.name(), "sim service started");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BridgeError> {
        self.transport.unregister_rpc_handler(&self.entity).await?;
        info!(entity = %self.entity, "sim service disconnected");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Value) -> Result<(Value, TransportStatus), BridgeError> {
        let uri: UUri = topic.parse()?;
        let envelope = Envelope::untyped(&payload)?;
        let status = match self.transport.publish(&uri, envelope).await {
            Ok(()) => TransportStatus::ok(),
            Err(status) => status,
        };
        debug!(entity = %self.entity, %uri, code = status.code, "sim service published");
        Ok((payload, status))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RPC handler
// ─────────────────────────────────────────────────────────────────────────────

struct SimRpcHandler {
    entity: String,
    state: Arc<Mutex<Map<String, Value>>>,
}

#[async_trait]
impl RpcHandler for SimRpcHandler {
    async fn handle(&self, method: &UUri, request: Envelope) -> Result<Envelope, TransportStatus> {
        let request = request
            .to_json()
            .map_err(|e| TransportStatus::new(status_code::INVALID_ARGUMENT, e.to_string()))?;
        let method_name = method.method_name().unwrap_or_default();
        debug!(entity = %self.entity, method = method_name, "sim service handling request");

        let response = if method_name == "SayHello" {
            let name = request.get("name").and_then(Value::as_str).unwrap_or("");
            json!({ "message": format!("Hello {name}") })
        } else {
            merge_request(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner), request);
            json!({ "status": { "code": status_code::OK, "message": "OK" } })
        };

        Envelope::untyped(&response).map_err(|e| TransportStatus::new(status_code::INTERNAL, e.to_string()))
    }
}

fn merge_request(state: &mut Map<String, Value>, request: Value) {
    let Value::Object(mut fields) = request else {
        return;
    };
    let mask: Option<Vec<String>> = fields
        .remove(UPDATE_MASK_FIELD)
        .and_then(|mask| mask.get("paths").cloned())
        .and_then(|paths| serde_json::from_value(paths).ok());

    for (key, value) in fields {
        let selected = match &mask {
            Some(paths) => paths.iter().any(|p| p == &key || p.starts_with(&format!("{key}."))),
            None => true,
        };
        if selected {
            state.insert(key, value);
        }
    }
}
