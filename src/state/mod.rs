mod connection;
mod room;
mod session;

pub use connection::{Connection, ConnectionRegistry, EventSender};
pub use room::{
    normalize_code, validate_display_name, BotHandle, Departure, RoomSnapshot, RoomStore,
    RoomSummary,
};

use crate::llm::{LlmConfig, LlmManager, ModelCatalog};

/// Errors reported back to the client that caused them
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Room not found")]
    RoomNotFound,

    #[error("Not in a room")]
    NotInRoom,

    #[error("Unknown bot '{0}'")]
    UnknownBot(String),

    #[error("Bot '{0}' is already in this room")]
    DuplicateBot(String),
}

impl RoomError {
    /// Stable error code for the wire protocol
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::InvalidInput(_) => "INVALID_INPUT",
            RoomError::InvalidMessage(_) => "INVALID_MESSAGE",
            RoomError::RoomNotFound => "ROOM_NOT_FOUND",
            RoomError::NotInRoom => "NOT_IN_ROOM",
            RoomError::UnknownBot(_) => "UNKNOWN_BOT",
            RoomError::DuplicateBot(_) => "DUPLICATE_BOT",
        }
    }
}

/// Shared application state. Owned by the server process and passed to
/// handlers as `Arc<AppState>`.
pub struct AppState {
    pub rooms: RoomStore,
    pub connections: ConnectionRegistry,
    pub llm: Option<LlmManager>,
    pub llm_config: LlmConfig,
    pub catalog: ModelCatalog,
}

impl AppState {
    /// State without any LLM provider (mentions will fail to dispatch)
    pub fn new() -> Self {
        Self::new_with_llm(None, LlmConfig::default(), ModelCatalog::default())
    }

    pub fn new_with_llm(
        llm: Option<LlmManager>,
        llm_config: LlmConfig,
        catalog: ModelCatalog,
    ) -> Self {
        Self {
            rooms: RoomStore::new(),
            connections: ConnectionRegistry::new(),
            llm,
            llm_config,
            catalog,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
