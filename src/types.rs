use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Opaque ID types
pub type ConnectionId = String;
pub type RoomCode = String;
pub type BotId = String;

/// Length of a join code (4 random bytes, hex encoded)
pub const ROOM_CODE_LEN: usize = 8;
pub const MAX_DISPLAY_NAME_CHARS: usize = 30;
pub const MAX_MESSAGE_CHARS: usize = 500;
/// Messages kept per room; older ones are evicted first
pub const HISTORY_CAPACITY: usize = 100;
/// Context turns kept per bot; older ones are evicted first
pub const CONTEXT_CAPACITY: usize = 40;

/// Author id used for everything not written by a human member
pub const SYSTEM_AUTHOR_ID: &str = "system";
/// Display name for server notices (bot added, unknown model, ...)
pub const SYSTEM_AUTHOR_NAME: &str = "System";

/// A human participant, scoped to one connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub id: ConnectionId,
    pub name: String,
}

/// Who wrote a chat entry. Bots and server notices use the synthetic
/// `system` id and carry their display name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    pub id: String,
    pub name: String,
}

impl Author {
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            id: SYSTEM_AUTHOR_ID.to_string(),
            name: name.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.id == SYSTEM_AUTHOR_ID
    }
}

impl From<&Member> for Author {
    fn from(m: &Member) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
        }
    }
}

/// A chat entry as stored in room history and sent over the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub user: Author,
    pub text: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(user: Author, text: impl Into<String>) -> Self {
        Self {
            user,
            text: text.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// One role-tagged entry in a bot's private conversation context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: String,
}

impl ContextTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }
}

/// An LLM participant attached to a room
#[derive(Debug, Clone)]
pub struct Bot {
    pub id: BotId,
    /// Short name used for `@name` mentions, unique within the room
    pub name: String,
    /// Resolved model binding in `provider:model` form
    pub model: String,
    pub context: Vec<ContextTurn>,
    /// Held for the duration of a dispatch so only one writer touches
    /// `context` at a time. Dispatches already waiting on it are admitted
    /// in the order they started waiting.
    pub gate: Arc<Mutex<()>>,
}

impl Bot {
    pub fn new(name: String, model: String) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            name,
            model,
            context: Vec::new(),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Append to context, evicting the oldest turns past capacity
    pub fn push_context(&mut self, turn: ContextTurn) {
        self.context.push(turn);
        if self.context.len() > CONTEXT_CAPACITY {
            let excess = self.context.len() - CONTEXT_CAPACITY;
            self.context.drain(..excess);
        }
    }
}

/// Public view of a bot (no context)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotInfo {
    pub name: String,
    pub model: String,
}

impl From<&Bot> for BotInfo {
    fn from(b: &Bot) -> Self {
        Self {
            name: b.name.clone(),
            model: b.model.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub code: RoomCode,
    /// Members in join order
    pub members: Vec<Member>,
    pub bots: Vec<Bot>,
    pub history: VecDeque<ChatMessage>,
    pub created_at: String,
}

impl Room {
    pub fn new(code: RoomCode, creator: Member) -> Self {
        Self {
            code,
            members: vec![creator],
            bots: Vec::new(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn bot_by_name(&self, name: &str) -> Option<&Bot> {
        self.bots.iter().find(|b| b.name == name)
    }

    pub fn bot_infos(&self) -> Vec<BotInfo> {
        self.bots.iter().map(BotInfo::from).collect()
    }

    /// Append to history, evicting from the front past capacity
    pub fn push_history(&mut self, message: ChatMessage) {
        self.history.push_back(message);
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }
}

/// Parsed `@bot prompt` command. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MentionCommand {
    pub bot: String,
    pub prompt: String,
}
