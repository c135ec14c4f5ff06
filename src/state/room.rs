use super::RoomError;
use crate::llm::ModelCatalog;
use crate::types::*;
use rand::RngCore;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Draw 4 random bytes from the OS-seeded CSPRNG and hex encode them
fn generate_join_code() -> RoomCode {
    let mut bytes = [0u8; ROOM_CODE_LEN / 2];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

/// Join codes are stored upper case; lookups accept any case
pub fn normalize_code(code: &str) -> RoomCode {
    code.to_ascii_uppercase()
}

/// Trim and check a display name (1..=30 chars)
pub fn validate_display_name(name: &str) -> Result<String, RoomError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_DISPLAY_NAME_CHARS {
        return Err(RoomError::InvalidInput("Invalid user name".to_string()));
    }
    Ok(trimmed.to_string())
}

/// What a joining member gets back
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub members: Vec<Member>,
    /// Oldest first
    pub messages: Vec<ChatMessage>,
}

/// Result of removing a member
#[derive(Debug, Clone, PartialEq)]
pub enum Departure {
    /// Room or member did not exist
    NotMember,
    /// Member removed, others remain
    Left { remaining: Vec<Member> },
    /// Last member left and the room was destroyed
    RoomClosed,
}

/// Everything the dispatcher needs to address one bot
#[derive(Debug, Clone)]
pub struct BotHandle {
    pub id: BotId,
    pub name: String,
    pub model: String,
    pub gate: std::sync::Arc<tokio::sync::Mutex<()>>,
}

impl From<&Bot> for BotHandle {
    fn from(b: &Bot) -> Self {
        Self {
            id: b.id.clone(),
            name: b.name.clone(),
            model: b.model.clone(),
            gate: b.gate.clone(),
        }
    }
}

/// Read-only overview of a room for the HTTP API
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoomSummary {
    pub code: RoomCode,
    pub members: Vec<Member>,
    pub bots: Vec<BotInfo>,
    pub message_count: usize,
    pub created_at: String,
}

/// Authoritative in-memory table of rooms
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: RwLock<HashMap<RoomCode, Room>>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with the caller as its only member
    pub async fn create_room(
        &self,
        member_id: &str,
        display_name: &str,
    ) -> Result<RoomCode, RoomError> {
        let name = validate_display_name(display_name)?;

        let mut rooms = self.rooms.write().await;
        let code = loop {
            let code = generate_join_code();
            if !rooms.contains_key(&code) {
                break code;
            }
            tracing::warn!("Join code collision on {}, retrying", code);
        };

        let creator = Member {
            id: member_id.to_string(),
            name,
        };
        rooms.insert(code.clone(), Room::new(code.clone(), creator));
        tracing::info!("Room {} created by {}", code, member_id);
        Ok(code)
    }

    /// Add (or rename) a member and return the current roster and history
    pub async fn join_room(
        &self,
        code: &str,
        member_id: &str,
        display_name: &str,
    ) -> Result<RoomSnapshot, RoomError> {
        if code.chars().count() != ROOM_CODE_LEN {
            return Err(RoomError::InvalidInput("Invalid room code".to_string()));
        }
        let code = normalize_code(code);
        let name = validate_display_name(display_name)?;

        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(&code).ok_or(RoomError::RoomNotFound)?;

        match room.members.iter_mut().find(|m| m.id == member_id) {
            Some(existing) => existing.name = name,
            None => room.members.push(Member {
                id: member_id.to_string(),
                name,
            }),
        }

        Ok(RoomSnapshot {
            code,
            members: room.members.clone(),
            messages: room.history.iter().cloned().collect(),
        })
    }

    /// Remove a member; destroys the room when nobody is left
    pub async fn leave_room(&self, code: &str, member_id: &str) -> Departure {
        let code = normalize_code(code);
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&code) else {
            return Departure::NotMember;
        };

        let before = room.members.len();
        room.members.retain(|m| m.id != member_id);
        if room.members.len() == before {
            return Departure::NotMember;
        }

        if room.members.is_empty() {
            rooms.remove(&code);
            tracing::info!("Room {} closed (no members left)", code);
            Departure::RoomClosed
        } else {
            Departure::Left {
                remaining: room.members.clone(),
            }
        }
    }

    pub async fn append_message(&self, code: &str, message: ChatMessage) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&normalize_code(code))
            .ok_or(RoomError::RoomNotFound)?;
        room.push_history(message);
        Ok(())
    }

    pub async fn contains(&self, code: &str) -> bool {
        self.rooms.read().await.contains_key(&normalize_code(code))
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// History, oldest first
    pub async fn history(&self, code: &str) -> Option<Vec<ChatMessage>> {
        self.rooms
            .read()
            .await
            .get(&normalize_code(code))
            .map(|r| r.history.iter().cloned().collect())
    }

    pub async fn members(&self, code: &str) -> Vec<Member> {
        self.rooms
            .read()
            .await
            .get(&normalize_code(code))
            .map(|r| r.members.clone())
            .unwrap_or_default()
    }

    pub async fn member(&self, code: &str, member_id: &str) -> Option<Member> {
        self.rooms
            .read()
            .await
            .get(&normalize_code(code))
            .and_then(|r| r.member(member_id).cloned())
    }

    /// Attach a bot resolved through the catalog and return the new bot list
    pub async fn add_bot(
        &self,
        code: &str,
        short_name: &str,
        catalog: &ModelCatalog,
    ) -> Result<Vec<BotInfo>, RoomError> {
        let short_name = short_name.trim();
        let model = catalog
            .resolve(short_name)
            .ok_or_else(|| RoomError::UnknownBot(short_name.to_string()))?
            .to_string();

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&normalize_code(code))
            .ok_or(RoomError::RoomNotFound)?;

        if room.bot_by_name(short_name).is_some() {
            return Err(RoomError::DuplicateBot(short_name.to_string()));
        }

        room.bots.push(Bot::new(short_name.to_string(), model));
        Ok(room.bot_infos())
    }

    /// Detach the bot at `index`. `None` if the room or index is unknown.
    pub async fn remove_bot(&self, code: &str, index: usize) -> Option<(BotInfo, Vec<BotInfo>)> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(&normalize_code(code))?;
        if index >= room.bots.len() {
            return None;
        }
        let removed = room.bots.remove(index);
        Some((BotInfo::from(&removed), room.bot_infos()))
    }

    pub async fn bots(&self, code: &str) -> Vec<BotInfo> {
        self.rooms
            .read()
            .await
            .get(&normalize_code(code))
            .map(|r| r.bot_infos())
            .unwrap_or_default()
    }

    pub async fn find_bot(&self, code: &str, name: &str) -> Option<BotHandle> {
        self.rooms
            .read()
            .await
            .get(&normalize_code(code))
            .and_then(|r| r.bot_by_name(name))
            .map(BotHandle::from)
    }

    /// Append a `user` turn to every bot in the room. Returns how many bots
    /// received it.
    pub async fn share_context(&self, code: &str, content: &str) -> usize {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&normalize_code(code)) else {
            return 0;
        };
        for bot in &mut room.bots {
            bot.push_context(ContextTurn::user(content));
        }
        room.bots.len()
    }

    pub async fn bot_context(&self, code: &str, bot_id: &str) -> Option<Vec<ContextTurn>> {
        self.rooms
            .read()
            .await
            .get(&normalize_code(code))
            .and_then(|r| r.bots.iter().find(|b| b.id == bot_id))
            .map(|b| b.context.clone())
    }

    /// Append turns to one bot's context. False if the bot is gone.
    pub async fn append_bot_turns(&self, code: &str, bot_id: &str, turns: Vec<ContextTurn>) -> bool {
        let mut rooms = self.rooms.write().await;
        match rooms
            .get_mut(&normalize_code(code))
            .and_then(|r| r.bots.iter_mut().find(|b| b.id == bot_id))
        {
            Some(bot) => {
                for turn in turns {
                    bot.push_context(turn);
                }
                true
            }
            None => false,
        }
    }

    pub async fn summary(&self, code: &str) -> Option<RoomSummary> {
        self.rooms
            .read()
            .await
            .get(&normalize_code(code))
            .map(|r| RoomSummary {
                code: r.code.clone(),
                members: r.members.clone(),
                bots: r.bot_infos(),
                message_count: r.history.len(),
                created_at: r.created_at.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModelCatalog {
        ModelCatalog::from_pairs([("alpha", "mock:one"), ("beta", "mock:two")])
    }

    #[tokio::test]
    async fn test_create_room_code_shape() {
        let store = RoomStore::new();
        let code = store.create_room("c1", "Ada").await.unwrap();

        assert_eq!(code.len(), ROOM_CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));

        let snapshot = store.join_room(&code, "c2", "Grace").await.unwrap();
        assert_eq!(snapshot.members.len(), 2);
        assert_eq!(snapshot.members[0].name, "Ada");
        assert!(snapshot.messages.is_empty());
    }

    #[tokio::test]
    async fn test_create_room_rejects_bad_names() {
        let store = RoomStore::new();
        assert!(matches!(
            store.create_room("c1", "   ").await,
            Err(RoomError::InvalidInput(_))
        ));
        assert!(matches!(
            store.create_room("c1", &"x".repeat(31)).await,
            Err(RoomError::InvalidInput(_))
        ));
        assert_eq!(store.room_count().await, 0);

        // 30 chars after trimming is fine
        let padded = format!("  {}  ", "y".repeat(30));
        let code = store.create_room("c1", &padded).await.unwrap();
        assert_eq!(store.members(&code).await[0].name, "y".repeat(30));
    }

    #[tokio::test]
    async fn test_join_room_errors() {
        let store = RoomStore::new();
        assert!(matches!(
            store.join_room("ABC", "c1", "Ada").await,
            Err(RoomError::InvalidInput(_))
        ));
        assert!(matches!(
            store.join_room("  ABCDEF12  ", "c1", "Ada").await,
            Err(RoomError::InvalidInput(_))
        ));
        assert!(matches!(
            store.join_room("ABCDEF12", "c1", "").await,
            Err(RoomError::InvalidInput(_))
        ));
        assert!(matches!(
            store.join_room("ABCDEF12", "c1", "Ada").await,
            Err(RoomError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn test_join_is_case_insensitive_and_overwrites() {
        let store = RoomStore::new();
        let code = store.create_room("c1", "Ada").await.unwrap();

        let snapshot = store
            .join_room(&code.to_lowercase(), "c1", "Ada L.")
            .await
            .unwrap();
        assert_eq!(snapshot.code, code);
        assert_eq!(snapshot.members.len(), 1);
        assert_eq!(snapshot.members[0].name, "Ada L.");
    }

    #[tokio::test]
    async fn test_history_truncation() {
        let store = RoomStore::new();
        let code = store.create_room("c1", "Ada").await.unwrap();
        let author = Author::system("test");

        for i in 0..150 {
            store
                .append_message(&code, ChatMessage::new(author.clone(), format!("m{}", i)))
                .await
                .unwrap();
        }

        let history = store.history(&code).await.unwrap();
        assert_eq!(history.len(), 100);
        assert_eq!(history[0].text, "m50");
        assert_eq!(history[99].text, "m149");

        let snapshot = store.join_room(&code, "c2", "Bob").await.unwrap();
        assert_eq!(snapshot.messages, history);
    }

    #[tokio::test]
    async fn test_leave_destroys_empty_room() {
        let store = RoomStore::new();
        let code = store.create_room("c1", "Ada").await.unwrap();
        store.join_room(&code, "c2", "Bob").await.unwrap();

        match store.leave_room(&code, "c1").await {
            Departure::Left { remaining } => assert_eq!(remaining.len(), 1),
            other => panic!("unexpected departure: {:?}", other),
        }
        assert_eq!(store.leave_room(&code, "c1").await, Departure::NotMember);
        assert_eq!(store.leave_room(&code, "c2").await, Departure::RoomClosed);
        assert!(!store.contains(&code).await);
    }

    #[tokio::test]
    async fn test_add_and_remove_bots() {
        let store = RoomStore::new();
        let catalog = catalog();
        let code = store.create_room("c1", "Ada").await.unwrap();

        let bots = store.add_bot(&code, "alpha", &catalog).await.unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].model, "mock:one");

        assert!(matches!(
            store.add_bot(&code, "gamma", &catalog).await,
            Err(RoomError::UnknownBot(_))
        ));
        assert!(matches!(
            store.add_bot(&code, "alpha", &catalog).await,
            Err(RoomError::DuplicateBot(_))
        ));
        assert!(matches!(
            store.add_bot("00000000", "alpha", &catalog).await,
            Err(RoomError::RoomNotFound)
        ));

        store.add_bot(&code, "beta", &catalog).await.unwrap();
        assert!(store.remove_bot(&code, 5).await.is_none());
        let (removed, remaining) = store.remove_bot(&code, 0).await.unwrap();
        assert_eq!(removed.name, "alpha");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "beta");
        assert!(store.find_bot(&code, "alpha").await.is_none());
    }

    #[tokio::test]
    async fn test_share_context_reaches_every_bot() {
        let store = RoomStore::new();
        let catalog = catalog();
        let code = store.create_room("c1", "Ada").await.unwrap();
        store.add_bot(&code, "alpha", &catalog).await.unwrap();
        store.add_bot(&code, "beta", &catalog).await.unwrap();

        assert_eq!(store.share_context(&code, "secret").await, 2);

        for name in ["alpha", "beta"] {
            let bot = store.find_bot(&code, name).await.unwrap();
            let context = store.bot_context(&code, &bot.id).await.unwrap();
            assert_eq!(context.len(), 1);
            assert_eq!(context[0].role, TurnRole::User);
            assert_eq!(context[0].content, "secret");
        }
    }

    #[tokio::test]
    async fn test_padded_code_of_live_room_is_rejected() {
        let store = RoomStore::new();
        let code = store.create_room("c1", "Ada").await.unwrap();

        assert!(matches!(
            store.join_room(&format!("  {}  ", code), "c2", "Bob").await,
            Err(RoomError::InvalidInput(_))
        ));
        assert_eq!(store.members(&code).await.len(), 1);
    }

    #[tokio::test]
    async fn test_bot_context_is_bounded() {
        let store = RoomStore::new();
        let code = store.create_room("c1", "Ada").await.unwrap();
        store.add_bot(&code, "alpha", &catalog()).await.unwrap();
        let bot = store.find_bot(&code, "alpha").await.unwrap();

        for i in 0..1000 {
            store.share_context(&code, &format!("fact {}", i)).await;
        }
        store
            .append_bot_turns(
                &code,
                &bot.id,
                vec![ContextTurn::user("asked"), ContextTurn::assistant("answered")],
            )
            .await;

        let context = store.bot_context(&code, &bot.id).await.unwrap();
        assert_eq!(context.len(), CONTEXT_CAPACITY);
        assert_eq!(context[CONTEXT_CAPACITY - 2].content, "asked");
        assert_eq!(context[CONTEXT_CAPACITY - 1].content, "answered");
        assert_eq!(context[0].content, format!("fact {}", 1000 - (CONTEXT_CAPACITY - 2)));
    }

    #[tokio::test]
    async fn test_append_bot_turns_for_removed_bot() {
        let store = RoomStore::new();
        let code = store.create_room("c1", "Ada").await.unwrap();
        store.add_bot(&code, "alpha", &catalog()).await.unwrap();
        let bot = store.find_bot(&code, "alpha").await.unwrap();

        assert!(
            store
                .append_bot_turns(&code, &bot.id, vec![ContextTurn::user("x")])
                .await
        );
        store.remove_bot(&code, 0).await.unwrap();
        assert!(
            !store
                .append_bot_turns(&code, &bot.id, vec![ContextTurn::user("y")])
                .await
        );
    }
}
