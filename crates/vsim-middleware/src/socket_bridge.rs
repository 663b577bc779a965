//! WebSocket bridge between the [`EventBus`] and UI clients.
//!
//! This module provides [`SocketBridge`], which:
//!
//! 1. **Streams** every notification on the bus to each connected client as
//!    a JSON text frame (`{"channel": "...", "payload": {...}}`).
//!
//! 2. **Accepts** [`BridgeCommand`] frames from clients and forwards them over
//!    an `mpsc` channel to whoever drives the bridge runtime.
//!
//! The bridge only handles serialisation and transport; it never interprets
//! the commands it forwards.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};
use vsim_types::{BridgeCommand, BridgeError, TransportStatus, status_code};

use crate::bus::EventBus;

/// Bridge between the notification bus and WebSocket clients.
#[derive(Clone)]
pub struct SocketBridge {
    bus: Arc<EventBus>,
    commands: mpsc::UnboundedSender<BridgeCommand>,
}

impl SocketBridge {
    /// Create a new bridge streaming `bus` and forwarding client commands to
    /// `commands`.
    pub fn new(bus: Arc<EventBus>, commands: mpsc::UnboundedSender<BridgeCommand>) -> Self {
        Self { bus, commands }
    }

    /// Bind a TCP listener on `addr`.
    ///
    /// Split from [`serve`](Self::serve) so callers binding port `0` can read
    /// the chosen address before serving.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] with `UNAVAILABLE` when the address cannot
    /// be bound.
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener, BridgeError> {
        TcpListener::bind(addr).await.map_err(|e| {
            BridgeError::Transport(TransportStatus::new(
                status_code::UNAVAILABLE,
                format!("ws bind error on {addr}: {e}"),
            ))
        })
    }

    /// Accept clients on `listener` forever.
    pub async fn serve(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "socket bridge listening");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), BridgeError> {
        let ws_stream = accept_async(stream).await.map_err(|e| {
            BridgeError::Transport(TransportStatus::new(
                status_code::UNAVAILABLE,
                format!("ws handshake from {peer}: {e}"),
            ))
        })?;

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut rx = self.bus.subscribe();

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(notification) => {
                            let json = serde_json::to_string(&notification)
                                .map_err(|e| BridgeError::Serialization(e.to_string()))?;
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(peer = %peer, lagged_by = n, "ws client lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            self.handle_incoming_ws_message(text.as_str());
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(())
    }

    /// Parse a client frame as a [`BridgeCommand`] and forward it.
    ///
    /// Malformed frames are logged and dropped.
    fn handle_incoming_ws_message(&self, text: &str) {
        match serde_json::from_str::<BridgeCommand>(text) {
            Ok(command) => {
                if self.commands.send(command).is_err() {
                    warn!("command receiver dropped; client command discarded");
                }
            }
            Err(e) => warn!(error = %e, "ignoring malformed client frame"),
        }
    }
}
