//! [`RpcDispatcher`] – sends one RPC and correlates its response.
//!
//! # Flow
//!
//! 1. Precondition gate; a failure emits `generic-error` and touches nothing.
//! 2. Resolve request/response types and the method address.
//! 3. Merge the field mask, populate and encode the request.
//! 4. Spawn the invocation, then emit `rpc-sent` while it is in flight.
//! 5. Decode and classify the response, read the last published payload,
//!    then count, append and emit `rpc-response` in one critical section.
//!
//! Any failure in steps 2–5 emits a single `rpc-exception` with the error's
//! diagnostic trace and leaves the counters alone.

use std::sync::Arc;

use tracing::{error, info, instrument};
use vsim_memory::{HistoryStore, NewRpcExchange};
use vsim_middleware::{CallOptions, EventSink, TransportGateway};
use vsim_types::{
    BridgeError, Notification, RpcExchange, RpcRequest, TransportStatus, UUri, diagnostic_trace,
    status_code,
};

use crate::classify;
use crate::normalize::with_update_mask;
use crate::preconditions::PreconditionGate;
use crate::schema::SchemaResolver;

/// Version used when resolving method addresses.
pub const METHOD_VERSION: u32 = 1;

/// Dispatches RPC requests through the transport gateway.
pub struct RpcDispatcher {
    transport: Arc<dyn TransportGateway>,
    schema: Arc<dyn SchemaResolver>,
    history: Arc<HistoryStore>,
    sink: Arc<dyn EventSink>,
    gate: Arc<PreconditionGate>,
    options: CallOptions,
}

impl RpcDispatcher {
    pub fn new(
        transport: Arc<dyn TransportGateway>,
        schema: Arc<dyn SchemaResolver>,
        history: Arc<HistoryStore>,
        sink: Arc<dyn EventSink>,
        gate: Arc<PreconditionGate>,
        options: CallOptions,
    ) -> Self {
        Self {
            transport,
            schema,
            history,
            sink,
            gate,
            options,
        }
    }

    /// Send `request` and wait for its response to be classified and recorded.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::Precondition`] – the gate refused; `generic-error`
    ///   was emitted.
    /// * Any resolution, mapping, transport or decode error; `rpc-exception`
    ///   was emitted.
    #[instrument(skip_all, fields(service = %request.service_class, method = %request.method_name))]
    pub async fn send_rpc(&self, request: RpcRequest) -> Result<Arc<RpcExchange>, BridgeError> {
        if let Err(message) = self.gate.verify_preconditions() {
            self.sink.notify(Notification::generic_error(message.clone()));
            return Err(BridgeError::Precondition(message));
        }

        let method_name = request.method_name.clone();
        match self.dispatch(request).await {
            Ok(exchange) => Ok(exchange),
            Err(e) => {
                let trace = diagnostic_trace(&e);
                error!(method = %method_name, error = %e, "rpc dispatch failed");
                self.sink.notify(Notification::RpcException { method_name, trace });
                Err(e)
            }
        }
    }

    async fn dispatch(&self, request: RpcRequest) -> Result<Arc<RpcExchange>, BridgeError> {
        let RpcRequest {
            method_name,
            service_class,
            field_mask,
            payload,
        } = request;
        let unknown_method = || BridgeError::UnknownMethod {
            service: service_class.clone(),
            method: method_name.clone(),
        };

        let request_type = self
            .schema
            .request_type(&service_class, &method_name)
            .ok_or_else(unknown_method)?;
        let response_type = self
            .schema
            .response_type(&service_class, &method_name)
            .ok_or_else(unknown_method)?;

        let payload = if field_mask.is_empty() {
            payload
        } else {
            with_update_mask(payload, &field_mask)?
        };
        let request_json = self.schema.populate(&request_type, &payload)?;
        let address: UUri = self
            .schema
            .method_address(&service_class, &method_name, METHOD_VERSION)?
            .parse()?;
        let envelope = self.schema.encode(&request_type, &request_json)?;

        let transport = Arc::clone(&self.transport);
        let options = self.options;
        let call = tokio::spawn(async move { transport.invoke_method(&address, envelope, options).await });

        self.sink.notify(Notification::RpcSent {
            message: sent_message(&method_name, self.transport.name()),
            method_name: method_name.clone(),
            data: request_json.clone(),
        });

        let response = call.await.map_err(|e| {
            BridgeError::Transport(TransportStatus::new(
                status_code::INTERNAL,
                format!("rpc invocation task failed: {e}"),
            ))
        })??;
        let response_json = self.schema.decode(&response_type, &response)?;
        let success = classify::is_success(&method_name, &response_json);

        // Pub/sub lock is released before the RPC lock is taken.
        let last_published = self.history.last_published();
        let sink = Arc::clone(&self.sink);
        let (exchange, counters) = self.history.record_rpc(
            NewRpcExchange {
                method_name,
                request: request_json,
                response: response_json,
                last_published,
                success,
            },
            |exchange, counters| {
                sink.notify(Notification::RpcResponse {
                    exchange: Arc::clone(exchange),
                    counters,
                });
            },
        );

        info!(
            sequence_number = exchange.sequence_number,
            success,
            total_rpc = counters.total_rpc,
            success_rpc = counters.success_rpc,
            "rpc response recorded"
        );
        Ok(exchange)
    }
}

/// User-facing message of the `rpc-sent` notification.
pub fn sent_message(method_name: &str, transport_name: &str) -> String {
    let mut message = format!("Successfully send rpc request for {method_name}");
    if transport_name.eq_ignore_ascii_case("zenoh") {
        message.push_str(" to Zenoh");
    }
    message
}
