//! In-process loopback transport.
//!
//! [`LoopbackTransport`] implements [`TransportGateway`] without a network:
//!
//! * **Methods** – an invocation is routed to the [`RpcHandler`] registered
//!   for the entity of the method address and bounded by
//!   [`CallOptions::timeout`].
//!
//! * **Topics** – a publish is delivered to every [`MessageListener`]
//!   registered on the topic, each on its own spawned task, so listeners run
//!   on transport-owned contexts exactly as they would with a real transport.
//!
//! It backs the CLI when no external transport is configured and is the
//! transport used by the simulated mock services.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};
use vsim_types::{Envelope, TransportStatus, UMessage, UUri, status_code};

use crate::transport::{CallOptions, MessageListener, RpcHandler, TransportGateway};

/// Name reported by a loopback transport built with [`LoopbackTransport::default`].
pub const LOOPBACK_TRANSPORT_NAME: &str = "LOOPBACK";

/// Transport that keeps all traffic inside the process.
pub struct LoopbackTransport {
    name: String,
    handlers: RwLock<HashMap<String, Arc<dyn RpcHandler>>>,
    listeners: RwLock<HashMap<String, Vec<Arc<dyn MessageListener>>>>,
}

impl LoopbackTransport {
    /// Create a loopback transport that reports itself as `name`.
    ///
    /// Naming it after the transport being simulated (e.g. `"ZENOH"`) lets
    /// the bridge produce the same user-facing messages as the real thing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Number of listeners currently registered on `topic`.
    pub fn listener_count(&self, topic: &UUri) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic.to_string())
            .map_or(0, Vec::len)
    }

    /// `true` when methods of `entity` are being served.
    pub fn serves(&self, entity: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(entity)
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(LOOPBACK_TRANSPORT_NAME)
    }
}

#[async_trait]
impl TransportGateway for LoopbackTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke_method(
        &self,
        method: &UUri,
        request: Envelope,
        options: CallOptions,
    ) -> Result<Envelope, TransportStatus> {
        if !method.is_method() {
            return Err(TransportStatus::new(
                status_code::INVALID_ARGUMENT,
                format!("{method} is not a method address"),
            ));
        }

        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&method.entity)
            .cloned()
            .ok_or_else(|| {
                TransportStatus::new(
                    status_code::NOT_FOUND,
                    format!("no service is serving {}", method.entity),
                )
            })?;

        match tokio::time::timeout(options.timeout, handler.handle(method, request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%method, timeout_ms = options.timeout.as_millis() as u64, "loopback invocation timed out");
                Err(TransportStatus::new(
                    status_code::DEADLINE_EXCEEDED,
                    format!("{method} did not answer within {} ms", options.timeout.as_millis()),
                ))
            }
        }
    }

    async fn publish(&self, topic: &UUri, payload: Envelope) -> Result<(), TransportStatus> {
        let listeners: Vec<Arc<dyn MessageListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic.to_string())
            .cloned()
            .unwrap_or_default();

        debug!(%topic, listeners = listeners.len(), "loopback publish");

        for listener in listeners {
            let message = UMessage {
                source: topic.clone(),
                payload: payload.clone(),
            };
            tokio::spawn(async move {
                listener.on_receive(message).await;
            });
        }
        Ok(())
    }

    async fn register_listener(
        &self,
        topic: &UUri,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), TransportStatus> {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let registered = listeners.entry(topic.to_string()).or_default();
        if !registered.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            registered.push(listener);
        }
        Ok(())
    }

    async fn unregister_listener(
        &self,
        topic: &UUri,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), TransportStatus> {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let key = topic.to_string();
        let Some(registered) = listeners.get_mut(&key) else {
            return Err(TransportStatus::new(
                status_code::NOT_FOUND,
                format!("no listener registered on {topic}"),
            ));
        };
        registered.retain(|l| !Arc::ptr_eq(l, &listener));
        if registered.is_empty() {
            listeners.remove(&key);
        }
        Ok(())
    }

    async fn register_rpc_handler(
        &self,
        entity: &str,
        handler: Arc<dyn RpcHandler>,
    ) -> Result<(), TransportStatus> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.to_string(), handler);
        Ok(())
    }

    async fn unregister_rpc_handler(&self, entity: &str) -> Result<(), TransportStatus> {
        match self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entity)
        {
            Some(_) => Ok(()),
            None => Err(TransportStatus::new(
                status_code::NOT_FOUND,
                format!("{entity} is not being served"),
            )),
        }
    }
}
