//! WebSocket accept path.
//!
//! # Responsibilities
//! - Register the new socket's endpoint identity before any frame flows
//! - Pump inbound frames to the operation's bus address as wrapped
//!   messages
//! - Pump the endpoint's two handler-id addresses back out to the socket
//! - Deregister on close
//!
//! # Design Decisions
//! - Frame forwarding is spawned so a slow service cannot stall the pump
//! - An undeliverable frame is logged and dropped, never retried
//! - Ping/pong is handled by the transport layer

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::gateway::server::AppState;
use crate::ws::endpoint::{Audience, PayloadKind, WsEndpoint, WsMessageWrapper};

pub(crate) async fn handle_socket(state: AppState, socket: WebSocket, path: String) {
    let endpoint = match state.ws_registry.register(&path).await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "WebSocket registration failed, closing");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let mut text_rx = state.bus.consumer(&endpoint.text_handler_id);
    let mut binary_rx = state.bus.consumer(&endpoint.binary_handler_id);

    loop {
        tokio::select! {
            Some(msg) = text_rx.recv() => {
                let text = String::from_utf8_lossy(&msg.body).into_owned();
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Some(msg) = binary_rx.recv() => {
                if sink.send(Message::Binary(msg.body.into())).await.is_err() {
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        spawn_forward(
                            &state,
                            &endpoint,
                            text.as_str().as_bytes().to_vec(),
                            PayloadKind::Text,
                        );
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        spawn_forward(&state, &endpoint, bytes.to_vec(), PayloadKind::Binary);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(url = %endpoint.url, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = state.ws_registry.deregister(&endpoint).await {
        tracing::warn!(url = %endpoint.url, error = %e, "WebSocket deregistration failed");
    }
}

/// Forward one inbound frame to the operation's bus address, off the pump
/// loop. The service answers through the ws-reply addresses; the reply
/// body here is only an ack and is discarded.
fn spawn_forward(state: &AppState, endpoint: &WsEndpoint, body: Vec<u8>, kind: PayloadKind) {
    let bus = state.bus.clone();
    let timeout = Duration::from_millis(state.config.gateway.dispatch_timeout_ms);
    let wrapper = WsMessageWrapper {
        endpoint: endpoint.clone(),
        body,
        kind,
        audience: Audience::Sender,
    };

    tokio::spawn(async move {
        let url = wrapper.endpoint.url.clone();
        let payload = match serde_json::to_vec(&wrapper) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to encode WebSocket frame, dropping");
                return;
            }
        };
        if let Err(e) = bus.request(&url, payload, timeout).await {
            tracing::debug!(url = %url, error = %e, "Dropping WebSocket frame");
        }
    });
}
