//! WebSocket handler for Axum
//!
//! Upgrades connections, pumps outbound events to the socket and routes
//! inbound frames into the engine.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use supportdesk_shared::ConnectionId;
use tokio::sync::mpsc;

use crate::engine::ChatEngine;
use crate::state::AppState;

use super::events::{ClientEvent, ServerEvent};

/// WebSocket handler - upgrades HTTP connection to WebSocket
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    tracing::debug!("WebSocket connection upgrade requested");
    let engine = app_state.engine.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, engine))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, engine: ChatEngine) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = engine.connect(tx).await;
    let connection_id = conn.id;
    drop(conn);

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, event_type = event.kind(), "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming messages; events from one connection are applied in order
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = ?e, "WebSocket receive error");
                break;
            }
        };

        if !handle_frame(&engine, connection_id, msg).await {
            break;
        }
    }

    // Cleanup on disconnect
    tracing::info!(connection_id = %connection_id, "WebSocket connection closing");
    engine.disconnect(connection_id).await;

    send_task.abort();
}

/// Apply one inbound frame; returns false once the peer asked to close
async fn handle_frame(engine: &ChatEngine, connection_id: ConnectionId, msg: Message) -> bool {
    match msg {
        Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => engine.handle(connection_id, event).await,
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = ?e,
                    message = %text,
                    "Failed to parse client event"
                );
                let _ = engine
                    .send_error(connection_id, &format!("Invalid event format: {e}"))
                    .await;
            }
        },
        Message::Binary(data) => {
            tracing::warn!(connection_id = %connection_id, bytes = data.len(), "Binary frame rejected");
            let _ = engine
                .send_error(connection_id, "Binary frames are not supported; send JSON text")
                .await;
        }
        Message::Close(_) => {
            tracing::info!(connection_id = %connection_id, "WebSocket close frame received");
            return false;
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum handles ping/pong automatically
        }
    }
    true
}
