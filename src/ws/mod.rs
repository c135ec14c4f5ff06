mod bots;
pub mod handlers;
mod room;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{InboundFrame, OutboundFrame, ServerMessage};
use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send one frame. False once the socket is gone.
async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &OutboundFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize outbound frame: {}", e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let connection_id = ulid::Ulid::new().to_string();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.on_connect(&connection_id, event_tx).await;

    tracing::info!("WebSocket connected: {}", connection_id);

    loop {
        tokio::select! {
            // Room events queued for this connection
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                if !send_frame(&mut sender, &OutboundFrame::from(event)).await {
                    break;
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message from {}: {}", connection_id, text);

                        let reply = match serde_json::from_str::<InboundFrame>(&text) {
                            Ok(frame) => handlers::handle_message(frame.message, &connection_id, &state)
                                .await
                                .map(|message| OutboundFrame {
                                    req_id: frame.req_id,
                                    message,
                                }),
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                Some(OutboundFrame::from(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                }))
                            }
                        };

                        if let Some(reply) = reply {
                            if !send_frame(&mut sender, &reply).await {
                                tracing::error!("Failed to send response to {}", connection_id);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed by {}", connection_id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error on {}: {}", connection_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.on_disconnect(&connection_id).await;
    tracing::info!("WebSocket connection closed: {}", connection_id);
}
