use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        display_name: String,
    },
    JoinRoom {
        code: String,
        display_name: String,
    },
    SendMessage {
        text: String,
    },
    /// Attach a bot from the model catalog. Outcome is reported to the room
    /// as a system message, never as an ack.
    AddLlmToRoom {
        code: String,
        bot: String,
    },
    /// Detach the bot at `index` (position in the room's bot list)
    RemoveLlmFromRoom {
        code: String,
        index: usize,
    },
    LeaveRoom,
}

/// Inbound frame: a client message plus an optional correlation id that is
/// echoed back on the acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub req_id: Option<String>,
    #[serde(flatten)]
    pub message: ClientMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    // Acknowledgments (sent only to the requesting connection)
    RoomCreated {
        code: RoomCode,
    },
    RoomJoined {
        code: RoomCode,
        members: Vec<Member>,
        messages: Vec<ChatMessage>,
    },
    MessageAccepted,
    RoomLeft,

    // Room events (sent to every member)
    /// A complete chat entry: user message, bot reply or system notice
    Message(ChatMessage),
    /// A bot started working on a reply (empty text)
    LlmMessageStart(ChatMessage),
    /// One streamed fragment of a bot reply
    LlmMessage(ChatMessage),
    /// A bot reply finished (empty text)
    LlmMessageEnd(ChatMessage),
    MembersUpdated {
        members: Vec<Member>,
    },
    BotsUpdated {
        bots: Vec<BotInfo>,
    },

    Error {
        code: String,
        msg: String,
    },
}

/// Outbound frame. `req_id` is only set on acknowledgments.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
    #[serde(flatten)]
    pub message: ServerMessage,
}

impl From<ServerMessage> for OutboundFrame {
    fn from(message: ServerMessage) -> Self {
        Self {
            req_id: None,
            message,
        }
    }
}
