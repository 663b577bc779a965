//! [`MockService`] – contract for a simulated vehicle subsystem.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use vsim_types::{BridgeError, TransportStatus};

/// A simulated vehicle subsystem.
///
/// Business logic lives entirely behind this trait; the bridge only starts,
/// stops and publishes through it.
#[async_trait]
pub trait MockService: Send + Sync {
    /// Entity name this service simulates, e.g. `"body.cabin_climate"`.
    fn entity(&self) -> &str;

    /// Begin serving requests.
    async fn start(&self) -> Result<(), BridgeError>;

    /// Stop serving requests.  Must complete before the service is dropped
    /// from the registry.
    async fn disconnect(&self) -> Result<(), BridgeError>;

    /// Publish `payload` on `topic`.
    ///
    /// Returns the message as published together with the transport status.
    /// A non-zero status is a normal outcome, not an `Err`; errors are
    /// reserved for payloads or addresses the service cannot handle.
    async fn publish(&self, topic: &str, payload: Value) -> Result<(Value, TransportStatus), BridgeError>;
}

/// Shared handle to a running service.
pub type ServiceHandle = Arc<dyn MockService>;
