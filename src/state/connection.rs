use crate::protocol::ServerMessage;
use crate::types::*;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// Outbound event queue of one live connection
pub type EventSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// The one room this connection is a member of, if any
    pub room: Option<RoomCode>,
    sender: EventSender,
}

/// Live transport connections and their room membership
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with no room
    pub async fn register(&self, id: &str, sender: EventSender) {
        let connection = Connection {
            id: id.to_string(),
            room: None,
            sender,
        };
        self.connections
            .write()
            .await
            .insert(id.to_string(), connection);
    }

    /// Drop a connection, returning the room it was in
    pub async fn unregister(&self, id: &str) -> Option<Option<RoomCode>> {
        self.connections
            .write()
            .await
            .remove(id)
            .map(|c| c.room)
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn current_room(&self, id: &str) -> Option<RoomCode> {
        self.connections
            .read()
            .await
            .get(id)
            .and_then(|c| c.room.clone())
    }

    /// Set the connection's room and return the previous one
    pub async fn set_room(&self, id: &str, room: Option<RoomCode>) -> Option<RoomCode> {
        let mut connections = self.connections.write().await;
        match connections.get_mut(id) {
            Some(c) => std::mem::replace(&mut c.room, room),
            None => None,
        }
    }

    /// Queue an event for one connection. Closed connections are skipped.
    pub async fn send_to(&self, id: &str, msg: ServerMessage) {
        if let Some(c) = self.connections.read().await.get(id) {
            if c.sender.send(msg).is_err() {
                tracing::debug!("Connection {} closed, dropping event", id);
            }
        }
    }

    /// Queue the same event for several connections, in the given order
    pub async fn send_to_many(&self, ids: &[ConnectionId], msg: &ServerMessage) {
        let connections = self.connections.read().await;
        for id in ids {
            if let Some(c) = connections.get(id) {
                // Receiver gone means the socket is shutting down
                let _ = c.sender.send(msg.clone());
            }
        }
    }
}
