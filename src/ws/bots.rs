//! Bot management handlers
//!
//! Outcomes are posted to the room as system messages, so these never
//! produce an ack.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use std::sync::Arc;

pub async fn handle_add_bot(
    state: &Arc<AppState>,
    connection_id: &str,
    code: String,
    bot: String,
) -> Option<ServerMessage> {
    tracing::info!("Add bot {} to room {} requested by {}", bot, code, connection_id);
    state.add_bot(connection_id, &code, &bot).await;
    None
}

pub async fn handle_remove_bot(
    state: &Arc<AppState>,
    connection_id: &str,
    code: String,
    index: usize,
) -> Option<ServerMessage> {
    tracing::info!(
        "Remove bot #{} from room {} requested by {}",
        index,
        code,
        connection_id
    );
    state.remove_bot(&code, index).await;
    None
}
