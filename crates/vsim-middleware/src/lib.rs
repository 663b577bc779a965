//! `vsim-middleware` – the bridge's boundary contracts and plumbing.
//!
//! Moves bytes and notifications between the dispatch core and the outside
//! world without caring about their meaning.
//!
//! # Modules
//!
//! - [`transport`] – [`TransportGateway`], the façade the dispatchers call to
//!   invoke methods, publish, and register listeners, plus the
//!   [`MessageListener`] and [`RpcHandler`] callback traits.
//! - [`sink`] – [`EventSink`], the notification contract of the UI boundary,
//!   and the buffering [`MemorySink`].
//! - [`bus`] – [`EventBus`], a broadcast-channel event sink partitioned into
//!   [`Lane`]s.
//! - [`loopback`] – [`LoopbackTransport`], an in-process transport that routes
//!   RPCs to registered handlers and publishes to local listeners.
//! - [`socket_bridge`] – [`SocketBridge`], a WebSocket server that streams
//!   bus notifications to UI clients and accepts
//!   [`BridgeCommand`][vsim_types::BridgeCommand] frames from them.

pub mod bus;
pub mod loopback;
pub mod sink;
pub mod socket_bridge;
pub mod transport;

pub use bus::{ChannelSubscriber, EventBus, Lane, LaneReceiver};
pub use loopback::LoopbackTransport;
pub use sink::{EventSink, MemorySink};
pub use socket_bridge::SocketBridge;
pub use transport::{CallOptions, MessageListener, RpcHandler, TransportGateway};
