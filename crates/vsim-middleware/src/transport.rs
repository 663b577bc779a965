//! The Transport Gateway contract.
//!
//! The dispatch core never speaks to a concrete transport.  It calls a
//! [`TransportGateway`] and receives inbound traffic through the
//! [`MessageListener`] and [`RpcHandler`] callbacks, which the transport
//! drives from its own execution contexts.
//!
//! # Contract
//!
//! * `invoke_method` – send a request envelope to a method address and
//!   resolve with the response envelope, or with the [`TransportStatus`] that
//!   explains why no response was produced.  The transport is responsible for
//!   honouring [`CallOptions::timeout`].
//!
//! * `register_listener` – route every message published on a topic to the
//!   listener.  Registering the same listener twice on a topic is a no-op.
//!
//! * `register_rpc_handler` – serve every method of an entity.  Used by mock
//!   services; transports that cannot serve methods keep the default
//!   `UNIMPLEMENTED` answer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vsim_types::{Envelope, TransportStatus, UMessage, UUri, status_code};

/// Upper bound handed to the transport for every RPC invocation.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Per-invocation options passed through to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    pub timeout: Duration,
}

impl CallOptions {
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

/// Receives messages published on the topics it was registered for.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_receive(&self, message: UMessage);
}

/// Serves inbound method invocations for one entity.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, method: &UUri, request: Envelope) -> Result<Envelope, TransportStatus>;
}

/// Boundary façade over the underlying message transport.
#[async_trait]
pub trait TransportGateway: Send + Sync {
    /// Human-readable transport name, e.g. `"ZENOH"`.
    fn name(&self) -> &str;

    /// Invoke `method` with `request` and wait for the correlated response.
    async fn invoke_method(
        &self,
        method: &UUri,
        request: Envelope,
        options: CallOptions,
    ) -> Result<Envelope, TransportStatus>;

    /// Publish `payload` on `topic`.
    async fn publish(&self, topic: &UUri, payload: Envelope) -> Result<(), TransportStatus>;

    /// Route messages published on `topic` to `listener`.
    async fn register_listener(
        &self,
        topic: &UUri,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), TransportStatus>;

    /// Stop routing `topic` to `listener`.
    async fn unregister_listener(
        &self,
        topic: &UUri,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), TransportStatus>;

    /// Serve every method of `entity` with `handler`.
    async fn register_rpc_handler(
        &self,
        entity: &str,
        _handler: Arc<dyn RpcHandler>,
    ) -> Result<(), TransportStatus> {
        Err(TransportStatus::new(
            status_code::UNIMPLEMENTED,
            format!("{} cannot serve methods for {entity}", self.name()),
        ))
    }

    /// Stop serving the methods of `entity`.
    async fn unregister_rpc_handler(&self, entity: &str) -> Result<(), TransportStatus> {
        Err(TransportStatus::new(
            status_code::UNIMPLEMENTED,
            format!("{} cannot serve methods for {entity}", self.name()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PublishOnly;

    #[async_trait]
    impl TransportGateway for PublishOnly {
        fn name(&self) -> &str {
            "PUBLISH_ONLY"
        }

        async fn invoke_method(
            &self,
            _method: &UUri,
            _request: Envelope,
            _options: CallOptions,
        ) -> Result<Envelope, TransportStatus> {
            Err(TransportStatus::new(status_code::UNAVAILABLE, "no rpc"))
        }

        async fn publish(&self, _topic: &UUri, _payload: Envelope) -> Result<(), TransportStatus> {
            Ok(())
        }

        async fn register_listener(
            &self,
            _topic: &UUri,
            _listener: Arc<dyn MessageListener>,
        ) -> Result<(), TransportStatus> {
            Ok(())
        }

        async fn unregister_listener(
            &self,
            _topic: &UUri,
            _listener: Arc<dyn MessageListener>,
        ) -> Result<(), TransportStatus> {
            Ok(())
        }
    }

    struct NoopHandler;

    #[async_trait]
    impl RpcHandler for NoopHandler {
        async fn handle(&self, _method: &UUri, request: Envelope) -> Result<Envelope, TransportStatus> {
            Ok(request)
        }
    }

    #[test]
    fn default_call_options_use_fifteen_seconds() {
        assert_eq!(CallOptions::default().timeout, Duration::from_millis(15_000));
        assert_eq!(
            CallOptions::with_timeout_ms(250).timeout,
            Duration::from_millis(250)
        );
    }

    #[tokio::test]
    async fn serving_methods_is_unimplemented_by_default() {
        let transport = PublishOnly;
        let status = transport
            .register_rpc_handler("body.horn", Arc::new(NoopHandler))
            .await
            .unwrap_err();
        assert_eq!(status.code, status_code::UNIMPLEMENTED);
        assert!(status.message.contains("body.horn"));

        let status = transport.unregister_rpc_handler("body.horn").await.unwrap_err();
        assert_eq!(status.code, status_code::UNIMPLEMENTED);
    }
}
