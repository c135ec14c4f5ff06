//! Message routing
//!
//! Every chat message goes through [`route_message`]: validation, the
//! `#share` side channel, then either a bot mention or a plain broadcast.

use crate::llm::dispatch::Dispatch;
use crate::protocol::ServerMessage;
use crate::state::{AppState, RoomError};
use crate::types::*;
use std::sync::Arc;

/// Marker that copies a message into every bot's context
pub const SHARE_MARKER: &str = "#share";

/// What happened to one inbound chat message
#[derive(Debug)]
pub struct Routed {
    /// The message as stored and broadcast
    pub message: ChatMessage,
    /// Number of bots whose context received the shared text
    pub shared_with: usize,
    /// Bot reply to run, if the message mentioned an attached bot
    pub dispatch: Option<Dispatch>,
}

/// Trim and check length (1..=500 chars)
pub fn validate_message_text(text: &str) -> Result<String, RoomError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RoomError::InvalidMessage("message is empty".to_string()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(RoomError::InvalidMessage(format!(
            "message is longer than {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

/// `@name prompt`: the name is letters, digits and `_`, followed by
/// whitespace and a non-empty prompt.
pub fn parse_mention(text: &str) -> Option<MentionCommand> {
    let rest = text.strip_prefix('@')?;
    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }

    let (name, tail) = rest.split_at(name_len);
    if !tail.starts_with(char::is_whitespace) {
        return None;
    }
    let prompt = tail.trim();
    if prompt.is_empty() {
        return None;
    }

    Some(MentionCommand {
        bot: name.to_string(),
        prompt: prompt.to_string(),
    })
}

/// Text to share with all bots, if the message carries the marker.
/// The first marker is removed and the rest trimmed; nothing left means
/// nothing to share.
pub fn extract_shared(text: &str) -> Option<String> {
    if !text.contains(SHARE_MARKER) {
        return None;
    }
    let shared = text.replacen(SHARE_MARKER, "", 1).trim().to_string();
    (!shared.is_empty()).then_some(shared)
}

/// Validate, store and broadcast a member's message. A mention of an
/// attached bot yields a [`Dispatch`] for the caller to run; the user
/// message is already visible to the room by then.
pub async fn route_message(
    state: &Arc<AppState>,
    connection_id: &str,
    text: &str,
) -> Result<Routed, RoomError> {
    let text = validate_message_text(text)?;

    let code = state
        .connections
        .current_room(connection_id)
        .await
        .ok_or(RoomError::NotInRoom)?;
    let member = state
        .rooms
        .member(&code, connection_id)
        .await
        .ok_or(RoomError::NotInRoom)?;

    let shared_with = match extract_shared(&text) {
        Some(shared) => {
            let count = state.rooms.share_context(&code, &shared).await;
            tracing::debug!("Shared context with {} bots in {}", count, code);
            count
        }
        None => 0,
    };

    let bot = match parse_mention(&text) {
        Some(mention) => match state.rooms.find_bot(&code, &mention.bot).await {
            Some(bot) => Some((bot, mention.prompt)),
            None => {
                tracing::debug!("@{} is not attached to {}, plain message", mention.bot, code);
                None
            }
        },
        None => None,
    };

    let message = ChatMessage::new(Author::from(&member), text);
    state.rooms.append_message(&code, message.clone()).await?;
    state
        .broadcast_to_room(&code, ServerMessage::Message(message.clone()))
        .await;

    let dispatch = bot.map(|(bot, prompt)| Dispatch {
        room: code,
        bot,
        member_name: member.name,
        prompt,
    });

    Ok(Routed {
        message,
        shared_with,
        dispatch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmConfig, ModelCatalog};
    use tokio::sync::mpsc;

    #[test]
    fn test_validate_message_text() {
        assert_eq!(validate_message_text("  hi  ").unwrap(), "hi");
        assert!(validate_message_text(" \n\t ").is_err());
        assert!(validate_message_text(&"a".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(matches!(
            validate_message_text(&"a".repeat(MAX_MESSAGE_CHARS + 1)),
            Err(RoomError::InvalidMessage(_))
        ));
        // Length counts characters, not bytes
        assert!(validate_message_text(&"ü".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }

    #[test]
    fn test_parse_mention() {
        assert_eq!(
            parse_mention("@alpha hello there"),
            Some(MentionCommand {
                bot: "alpha".to_string(),
                prompt: "hello there".to_string(),
            })
        );
        assert_eq!(parse_mention("@gpt_4\n  why?").unwrap().prompt, "why?");

        assert_eq!(parse_mention("@alpha"), None);
        assert_eq!(parse_mention("@alpha   "), None);
        assert_eq!(parse_mention("@alpha,hello"), None);
        assert_eq!(parse_mention("@ hello"), None);
        assert_eq!(parse_mention("hi @alpha hello"), None);
    }

    #[test]
    fn test_extract_shared() {
        assert_eq!(extract_shared("#share secret").as_deref(), Some("secret"));
        assert_eq!(
            extract_shared("note this #share please").as_deref(),
            Some("note this  please")
        );
        assert_eq!(extract_shared("#share #share x").as_deref(), Some("#share x"));
        assert_eq!(extract_shared("#share   "), None);
        assert_eq!(extract_shared("nothing here"), None);
    }

    async fn room_with_bots() -> (Arc<AppState>, RoomCode, mpsc::UnboundedReceiver<ServerMessage>) {
        let state = Arc::new(AppState::new_with_llm(
            None,
            LlmConfig::default(),
            ModelCatalog::from_pairs([("alpha", "mock:a"), ("beta", "mock:b")]),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        state.on_connect("c1", tx).await;
        let code = state.create_room("c1", "Ada").await.unwrap();
        state.rooms.add_bot(&code, "alpha", &state.catalog).await.unwrap();
        state.rooms.add_bot(&code, "beta", &state.catalog).await.unwrap();
        (state, code, rx)
    }

    #[tokio::test]
    async fn test_route_requires_room() {
        let state = Arc::new(AppState::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        state.on_connect("c1", tx).await;

        let err = route_message(&state, "c1", "hello").await.unwrap_err();
        assert_eq!(err, RoomError::NotInRoom);
    }

    #[tokio::test]
    async fn test_route_plain_message() {
        let (state, code, mut rx) = room_with_bots().await;

        let routed = route_message(&state, "c1", "  hello  ").await.unwrap();
        assert!(routed.dispatch.is_none());
        assert_eq!(routed.message.text, "hello");
        assert_eq!(routed.message.user.name, "Ada");

        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Message(routed.message));
        assert_eq!(state.rooms.history(&code).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_route_mention_builds_dispatch() {
        let (state, code, mut rx) = room_with_bots().await;

        let routed = route_message(&state, "c1", "@alpha hello").await.unwrap();
        let dispatch = routed.dispatch.expect("mention should dispatch");
        assert_eq!(dispatch.bot.name, "alpha");
        assert_eq!(dispatch.prompt, "hello");
        assert_eq!(dispatch.member_name, "Ada");
        assert_eq!(dispatch.room, code);

        // The raw message is already out before any bot work starts
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Message(m) if m.text == "@alpha hello"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_route_unknown_mention_is_plain() {
        let (state, code, _rx) = room_with_bots().await;

        let routed = route_message(&state, "c1", "@ghost hi").await.unwrap();
        assert!(routed.dispatch.is_none());
        assert_eq!(state.rooms.history(&code).await.unwrap()[0].text, "@ghost hi");
    }

    #[tokio::test]
    async fn test_route_share_reaches_all_bots_without_dispatch() {
        let (state, code, _rx) = room_with_bots().await;

        let routed = route_message(&state, "c1", "#share secret").await.unwrap();
        assert_eq!(routed.shared_with, 2);
        assert!(routed.dispatch.is_none());

        for name in ["alpha", "beta"] {
            let bot = state.rooms.find_bot(&code, name).await.unwrap();
            let context = state.rooms.bot_context(&code, &bot.id).await.unwrap();
            assert_eq!(context.len(), 1);
            assert_eq!(context[0].role, TurnRole::User);
            assert_eq!(context[0].content, "secret");
        }
    }

    #[tokio::test]
    async fn test_repeated_shares_keep_context_bounded() {
        let (state, code, _rx) = room_with_bots().await;

        for i in 0..1000 {
            route_message(&state, "c1", &format!("#share fact {}", i))
                .await
                .unwrap();
        }

        let bot = state.rooms.find_bot(&code, "alpha").await.unwrap();
        let context = state.rooms.bot_context(&code, &bot.id).await.unwrap();
        assert_eq!(context.len(), CONTEXT_CAPACITY);
        assert_eq!(context.last().unwrap().content, "fact 999");
        assert_eq!(state.rooms.history(&code).await.unwrap().len(), HISTORY_CAPACITY);
    }

    #[tokio::test]
    async fn test_route_rejects_invalid_text_without_side_effects() {
        let (state, code, mut rx) = room_with_bots().await;

        let err = route_message(&state, "c1", &"x".repeat(501)).await.unwrap_err();
        assert!(matches!(err, RoomError::InvalidMessage(_)));
        assert!(state.rooms.history(&code).await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
