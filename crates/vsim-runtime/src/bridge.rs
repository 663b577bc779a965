//! [`Bridge`] – the facade the UI side talks to.
//!
//! A bridge owns the service registry, both dispatchers, the history store,
//! the event sink and the precondition gate.  Every command arriving from a
//! WebSocket client or the REPL goes through [`Bridge::handle_command`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vsim_middleware::{EventSink, LoopbackTransport, MemorySink};
//! use vsim_runtime::Bridge;
//!
//! # async fn run() -> Result<(), vsim_types::BridgeError> {
//! let sink: Arc<dyn EventSink> = Arc::new(MemorySink::new());
//! let bridge = Bridge::builder(Arc::new(LoopbackTransport::new("ZENOH")), sink).build();
//! bridge.start_service("example.hello_world").await?;
//! assert_eq!(bridge.running_services().await, vec!["example.hello_world".to_string()]);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use vsim_memory::HistoryStore;
use vsim_middleware::{CallOptions, EventSink, TransportGateway};
use vsim_services::{ServiceCatalog, ServiceRegistry};
use vsim_types::{
    BridgeCommand, BridgeError, Counters, Notification, PubSubEvent, PublishRequest, RpcExchange,
    RpcRequest,
};

use crate::preconditions::{Check, PreconditionGate, SupportedTransportCheck};
use crate::pubsub::{DEFAULT_TOPIC_PACING, PubSubDispatcher, SubscriptionListener};
use crate::rpc::RpcDispatcher;
use crate::schema::{OpenSchema, SchemaResolver};

/// Transports the default configuration accepts.
pub const DEFAULT_SUPPORTED_TRANSPORTS: [&str; 5] = ["ZENOH", "SOCKET", "SOMEIP", "BINDER", "LOOPBACK"];

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime tunables of a [`Bridge`].
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Bound on every RPC invocation, handed to the transport.
    pub rpc_timeout: Duration,
    /// Delay between recording a topic update and announcing it.
    pub topic_pacing: Duration,
    /// Delay between a service starting and `service-started`.
    pub service_settle: Duration,
    pub supported_transports: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: CallOptions::default().timeout,
            topic_pacing: DEFAULT_TOPIC_PACING,
            service_settle: Duration::from_millis(1_000),
            supported_transports: DEFAULT_SUPPORTED_TRANSPORTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What a successfully handled [`BridgeCommand`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    /// The command had no result beyond its notifications.
    Done,
    Rpc(Arc<RpcExchange>),
    PubSub(Arc<PubSubEvent>),
    RunningServices(Vec<String>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Assembles a [`Bridge`].
///
/// Unset parts default to a simulated catalog on the same transport, the
/// naming-convention [`OpenSchema`], an empty in-memory history and
/// [`BridgeConfig::default`].
pub struct BridgeBuilder {
    transport: Arc<dyn TransportGateway>,
    sink: Arc<dyn EventSink>,
    catalog: Option<ServiceCatalog>,
    schema: Option<Arc<dyn SchemaResolver>>,
    history: Option<Arc<HistoryStore>>,
    config: BridgeConfig,
    checks: Vec<Box<dyn Check>>,
}

impl BridgeBuilder {
    pub fn catalog(mut self, catalog: ServiceCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn schema(mut self, schema: Arc<dyn SchemaResolver>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Use `history`, e.g. one resumed from an archive.
    pub fn history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a precondition evaluated after the supported-transport check.
    pub fn check(mut self, check: Box<dyn Check>) -> Self {
        self.checks.push(check);
        self
    }

    pub fn build(self) -> Bridge {
        let Self {
            transport,
            sink,
            catalog,
            schema,
            history,
            config,
            checks,
        } = self;

        let catalog = catalog.unwrap_or_else(|| ServiceCatalog::simulated(Arc::clone(&transport)));
        let schema = schema.unwrap_or_else(|| Arc::new(OpenSchema));
        let history = history.unwrap_or_default();

        let mut gate = PreconditionGate::new();
        gate.add_check(Box::new(SupportedTransportCheck::new(
            transport.name(),
            config.supported_transports.iter().cloned(),
        )));
        for check in checks {
            gate.add_check(check);
        }
        let gate = Arc::new(gate);

        let registry = Arc::new(ServiceRegistry::new(catalog));
        let rpc = RpcDispatcher::new(
            Arc::clone(&transport),
            Arc::clone(&schema),
            Arc::clone(&history),
            Arc::clone(&sink),
            Arc::clone(&gate),
            CallOptions {
                timeout: config.rpc_timeout,
            },
        );
        let listener = Arc::new(SubscriptionListener::new(
            schema,
            Arc::clone(&history),
            Arc::clone(&sink),
            transport.name(),
            config.topic_pacing,
        ));
        let pubsub = PubSubDispatcher::new(
            Arc::clone(&transport),
            Arc::clone(&registry),
            Arc::clone(&history),
            Arc::clone(&sink),
            Arc::clone(&gate),
            listener,
        );

        info!(transport = transport.name(), "bridge assembled");
        Bridge {
            transport,
            registry,
            history,
            sink,
            gate,
            rpc,
            pubsub,
            config,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge
// ─────────────────────────────────────────────────────────────────────────────

pub struct Bridge {
    transport: Arc<dyn TransportGateway>,
    registry: Arc<ServiceRegistry>,
    history: Arc<HistoryStore>,
    sink: Arc<dyn EventSink>,
    gate: Arc<PreconditionGate>,
    rpc: RpcDispatcher,
    pubsub: PubSubDispatcher,
    config: BridgeConfig,
}

impl Bridge {
    pub fn builder(transport: Arc<dyn TransportGateway>, sink: Arc<dyn EventSink>) -> BridgeBuilder {
        BridgeBuilder {
            transport,
            sink,
            catalog: None,
            schema: None,
            history: None,
            config: BridgeConfig::default(),
            checks: Vec::new(),
        }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Emit `generic-error` for `err` and hand it back.
    fn report(&self, err: BridgeError) -> BridgeError {
        warn!(error = %err, "bridge command failed");
        self.sink.notify(Notification::generic_error(err.to_string()));
        err
    }

    // ── Service lifecycle ──────────────────────────────────────────────────

    /// Start the mock service for `entity`, wait for it to settle, then emit
    /// `service-started`.
    pub async fn start_service(&self, entity: &str) -> Result<(), BridgeError> {
        if let Err(message) = self.gate.verify_preconditions() {
            self.sink.notify(Notification::generic_error(message.clone()));
            return Err(BridgeError::Precondition(message));
        }
        self.registry.start(entity).await.map_err(|e| self.report(e))?;

        tokio::time::sleep(self.config.service_settle).await;
        info!(%entity, "service started");
        self.sink.notify(Notification::ServiceStarted {
            entity: entity.to_string(),
        });
        Ok(())
    }

    pub async fn stop_service(&self, entity: &str) -> Result<(), BridgeError> {
        self.registry.stop(entity).await.map_err(|e| self.report(e))?;
        info!(%entity, "service stopped");
        self.sink.notify(Notification::ServiceStopped {
            entity: entity.to_string(),
        });
        Ok(())
    }

    pub async fn running_services(&self) -> Vec<String> {
        self.registry.get_all_running().await
    }

    /// Entities that can be passed to [`Bridge::start_service`].
    pub fn available_services(&self) -> Vec<&'static str> {
        self.registry.available()
    }

    // ── Dispatch ───────────────────────────────────────────────────────────

    pub async fn send_rpc(&self, request: RpcRequest) -> Result<Arc<RpcExchange>, BridgeError> {
        self.rpc.send_rpc(request).await
    }

    pub async fn publish(&self, request: PublishRequest) -> Result<Arc<PubSubEvent>, BridgeError> {
        self.pubsub.publish(request).await
    }

    pub async fn subscribe(&self, topic: &str) -> Result<Arc<PubSubEvent>, BridgeError> {
        self.pubsub.subscribe(topic).await
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), BridgeError> {
        self.pubsub.unsubscribe(topic).await.map_err(|e| match e {
            // The dispatcher has already announced it.
            BridgeError::Precondition(_) => e,
            e => self.report(e),
        })
    }

    // ── History ────────────────────────────────────────────────────────────

    pub fn counters(&self) -> Counters {
        self.history.counters()
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Forget every exchange and event and zero the counters.
    pub fn reset_history(&self) {
        self.history.clear();
        info!("history reset");
    }

    // ── Commands ───────────────────────────────────────────────────────────

    /// Route one UI command to the matching operation.
    pub async fn handle_command(&self, command: BridgeCommand) -> Result<CommandReply, BridgeError> {
        match command {
            BridgeCommand::SendRpc(request) => self.send_rpc(request).await.map(CommandReply::Rpc),
            BridgeCommand::Publish(request) => self.publish(request).await.map(CommandReply::PubSub),
            BridgeCommand::Subscribe { topic } => self.subscribe(&topic).await.map(CommandReply::PubSub),
            BridgeCommand::Unsubscribe { topic } => {
                self.unsubscribe(&topic).await.map(|()| CommandReply::Done)
            }
            BridgeCommand::StartService { entity } => {
                self.start_service(&entity).await.map(|()| CommandReply::Done)
            }
            BridgeCommand::StopService { entity } => {
                self.stop_service(&entity).await.map(|()| CommandReply::Done)
            }
            BridgeCommand::RunningServices => {
                Ok(CommandReply::RunningServices(self.running_services().await))
            }
        }
    }
}
