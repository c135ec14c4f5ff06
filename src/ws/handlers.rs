//! WebSocket message dispatch
//!
//! Entry point for inbound client messages. Each message is routed to the
//! room or bot handler module; the return value is the ack (if any) for the
//! connection that sent it.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, RoomError};
use std::sync::Arc;

use super::{bots, room};

/// Wire form of an error for the requesting connection
pub fn error_response(e: &RoomError) -> ServerMessage {
    ServerMessage::Error {
        code: e.code().to_string(),
        msg: e.to_string(),
    }
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    connection_id: &str,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateRoom { display_name } => {
            room::handle_create_room(state, connection_id, display_name).await
        }

        ClientMessage::JoinRoom { code, display_name } => {
            room::handle_join_room(state, connection_id, code, display_name).await
        }

        ClientMessage::SendMessage { text } => {
            room::handle_send_message(state, connection_id, text).await
        }

        ClientMessage::LeaveRoom => room::handle_leave_room(state, connection_id).await,

        ClientMessage::AddLlmToRoom { code, bot } => {
            bots::handle_add_bot(state, connection_id, code, bot).await
        }

        ClientMessage::RemoveLlmFromRoom { code, index } => {
            bots::handle_remove_bot(state, connection_id, code, index).await
        }
    }
}
