use super::{AppState, Departure, EventSender, RoomError, RoomSnapshot};
use crate::protocol::ServerMessage;
use crate::types::*;

impl AppState {
    /// Register a fresh connection (no room yet)
    pub async fn on_connect(&self, connection_id: &str, sender: EventSender) {
        self.connections.register(connection_id, sender).await;
        tracing::info!(
            "Connection {} registered ({} live)",
            connection_id,
            self.connections.count().await
        );
    }

    /// Release a connection and its room membership. Safe to call twice.
    pub async fn on_disconnect(&self, connection_id: &str) {
        let Some(room) = self.connections.unregister(connection_id).await else {
            return;
        };
        if let Some(code) = room {
            self.depart(&code, connection_id).await;
        }
        tracing::info!("Connection {} released", connection_id);
    }

    /// Remove a member from a room and tell whoever is left
    async fn depart(&self, code: &str, connection_id: &str) {
        match self.rooms.leave_room(code, connection_id).await {
            Departure::Left { remaining } => {
                self.broadcast_to_room(code, ServerMessage::MembersUpdated { members: remaining })
                    .await;
            }
            Departure::RoomClosed => {
                tracing::debug!("{} was the last member of {}", connection_id, code);
            }
            Departure::NotMember => {}
        }
    }

    /// Create a room owned by this connection, leaving any previous room
    pub async fn create_room(
        &self,
        connection_id: &str,
        display_name: &str,
    ) -> Result<RoomCode, RoomError> {
        let code = self.rooms.create_room(connection_id, display_name).await?;
        if let Some(previous) = self
            .connections
            .set_room(connection_id, Some(code.clone()))
            .await
        {
            self.depart(&previous, connection_id).await;
        }
        Ok(code)
    }

    /// Join an existing room, leaving any other room first
    pub async fn join_room(
        &self,
        connection_id: &str,
        code: &str,
        display_name: &str,
    ) -> Result<RoomSnapshot, RoomError> {
        let snapshot = self
            .rooms
            .join_room(code, connection_id, display_name)
            .await?;

        let previous = self
            .connections
            .set_room(connection_id, Some(snapshot.code.clone()))
            .await;
        if let Some(previous) = previous.filter(|p| *p != snapshot.code) {
            self.depart(&previous, connection_id).await;
        }

        self.broadcast_to_room(
            &snapshot.code,
            ServerMessage::MembersUpdated {
                members: snapshot.members.clone(),
            },
        )
        .await;

        Ok(snapshot)
    }

    /// Explicitly leave the current room
    pub async fn leave_room(&self, connection_id: &str) -> Result<(), RoomError> {
        let code = self
            .connections
            .set_room(connection_id, None)
            .await
            .ok_or(RoomError::NotInRoom)?;
        self.depart(&code, connection_id).await;
        Ok(())
    }

    /// Deliver an event to every current member of a room, in member order
    pub async fn broadcast_to_room(&self, code: &str, msg: ServerMessage) {
        let ids: Vec<ConnectionId> = self
            .rooms
            .members(code)
            .await
            .into_iter()
            .map(|m| m.id)
            .collect();
        self.connections.send_to_many(&ids, &msg).await;
    }

    /// Store and broadcast a notice authored by the system
    pub async fn post_system_message(&self, code: &str, text: impl Into<String>) {
        let message = ChatMessage::new(Author::system(SYSTEM_AUTHOR_NAME), text);
        if let Err(e) = self.rooms.append_message(code, message.clone()).await {
            tracing::debug!("Dropping system message for {}: {}", code, e);
            return;
        }
        self.broadcast_to_room(code, ServerMessage::Message(message))
            .await;
    }

    /// Attach a bot by catalog short name. Every outcome is reported as a
    /// chat notice rather than an error.
    pub async fn add_bot(&self, requester: &str, code: &str, short_name: &str) {
        match self.rooms.add_bot(code, short_name, &self.catalog).await {
            Ok(bots) => {
                let model = bots
                    .iter()
                    .find(|b| b.name == short_name.trim())
                    .map(|b| b.model.clone())
                    .unwrap_or_default();
                tracing::info!("Bot {} ({}) added to {}", short_name, model, code);
                self.post_system_message(
                    code,
                    format!("{} joined the room ({})", short_name.trim(), model),
                )
                .await;
                self.broadcast_to_room(code, ServerMessage::BotsUpdated { bots })
                    .await;
            }
            Err(RoomError::RoomNotFound) => {
                tracing::warn!("add bot {} to unknown room {}", short_name, code);
                // No room to post into, tell the requester directly
                let notice = ChatMessage::new(
                    Author::system(SYSTEM_AUTHOR_NAME),
                    format!("Room {} not found", code),
                );
                self.connections
                    .send_to(requester, ServerMessage::Message(notice))
                    .await;
            }
            Err(e) => {
                tracing::info!("Rejected bot {} for {}: {}", short_name, code, e);
                let available = self.catalog.names().join(", ");
                let text = if available.is_empty() {
                    format!("{}. No models are configured.", e)
                } else {
                    format!("{}. Available: {}", e, available)
                };
                self.post_system_message(code, text).await;
            }
        }
    }

    /// Detach the bot at `index`; silently ignores unknown rooms and indexes
    pub async fn remove_bot(&self, code: &str, index: usize) {
        let Some((removed, bots)) = self.rooms.remove_bot(code, index).await else {
            tracing::debug!("remove bot #{} from {}: nothing to remove", index, code);
            return;
        };
        tracing::info!("Bot {} removed from {}", removed.name, code);
        self.post_system_message(code, format!("{} left the room", removed.name))
            .await;
        self.broadcast_to_room(code, ServerMessage::BotsUpdated { bots })
            .await;
    }
}
