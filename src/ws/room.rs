//! Room and chat handlers
//!
//! Membership changes and chat messages. Each handler returns the ack for
//! the requesting connection; room-wide events go out through the state.

use crate::protocol::ServerMessage;
use crate::router::route_message;
use crate::state::AppState;
use std::sync::Arc;

use super::handlers::error_response;

pub async fn handle_create_room(
    state: &Arc<AppState>,
    connection_id: &str,
    display_name: String,
) -> Option<ServerMessage> {
    tracing::info!("Create room request from {}", connection_id);
    match state.create_room(connection_id, &display_name).await {
        Ok(code) => Some(ServerMessage::RoomCreated { code }),
        Err(e) => Some(error_response(&e)),
    }
}

pub async fn handle_join_room(
    state: &Arc<AppState>,
    connection_id: &str,
    code: String,
    display_name: String,
) -> Option<ServerMessage> {
    tracing::info!("Join request for room {} from {}", code, connection_id);
    match state.join_room(connection_id, &code, &display_name).await {
        Ok(snapshot) => Some(ServerMessage::RoomJoined {
            code: snapshot.code,
            members: snapshot.members,
            messages: snapshot.messages,
        }),
        Err(e) => Some(error_response(&e)),
    }
}

pub async fn handle_leave_room(
    state: &Arc<AppState>,
    connection_id: &str,
) -> Option<ServerMessage> {
    match state.leave_room(connection_id).await {
        Ok(()) => Some(ServerMessage::RoomLeft),
        Err(e) => Some(error_response(&e)),
    }
}

/// Route a chat message. A bot reply triggered by it runs in the
/// background and reaches the room as events.
pub async fn handle_send_message(
    state: &Arc<AppState>,
    connection_id: &str,
    text: String,
) -> Option<ServerMessage> {
    match route_message(state, connection_id, &text).await {
        Ok(routed) => {
            if let Some(dispatch) = routed.dispatch {
                tracing::info!(
                    "Dispatching @{} in room {} for {}",
                    dispatch.bot.name,
                    dispatch.room,
                    connection_id
                );
                let state = state.clone();
                tokio::spawn(async move {
                    dispatch.run(state).await;
                });
            }
            Some(ServerMessage::MessageAccepted)
        }
        Err(e) => {
            tracing::debug!("Message from {} rejected: {}", connection_id, e);
            Some(error_response(&e))
        }
    }
}
