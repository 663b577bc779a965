//! `vsim-runtime` – the RPC/pub-sub dispatch core.
//!
//! Correlates asynchronous transport events with the logical request that
//! caused them, keeps the history and counters consistent, and turns every
//! outcome into a [`Notification`][vsim_types::Notification] for the UI.
//!
//! # Modules
//!
//! - [`rpc`] – [`RpcDispatcher`]: validate, resolve, send, classify and
//!   record one RPC.
//! - [`pubsub`] – [`PubSubDispatcher`] and the shared
//!   [`SubscriptionListener`]: publish through running services, subscribe
//!   to topics, and turn inbound topic messages into `topic-update`
//!   notifications.
//! - [`bridge`] – [`Bridge`]: the facade owning the registry, both
//!   dispatchers, the history store and the precondition gate.
//! - [`schema`] – [`SchemaResolver`], plus the TOML-driven [`SchemaCatalog`]
//!   and the name-derived [`OpenSchema`].
//! - [`classify`] – ordered success matchers for RPC responses.
//! - [`normalize`] – dot-path flattening and field-mask merging of value
//!   trees.
//! - [`preconditions`] – [`PreconditionGate`] and its [`Check`]s.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber with an optional OTLP span exporter.
//!
//! # Locking
//!
//! The RPC path reads the last published payload under the pub/sub lock and
//! releases it before taking the RPC lock.  The pacing delay of topic updates
//! runs with no lock held.

pub mod bridge;
pub mod classify;
pub mod normalize;
pub mod preconditions;
pub mod pubsub;
pub mod rpc;
pub mod schema;
pub mod telemetry;

pub use bridge::{Bridge, BridgeBuilder, BridgeConfig, CommandReply};
pub use preconditions::{Check, FnCheck, PreconditionGate, SupportedTransportCheck};
pub use pubsub::{PubSubDispatcher, SubscriptionListener};
pub use rpc::RpcDispatcher;
pub use schema::{OpenSchema, SchemaCatalog, SchemaResolver};
pub use telemetry::{TracerProviderGuard, init_tracing};
