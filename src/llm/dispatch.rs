//! Bot dispatch
//!
//! Runs one mention end to end: announce the reply, stream fragments from the
//! provider to the room, then commit the exchange to room history and to the
//! bot's context. A failed dispatch leaves no trace beyond the start event.

use super::{ChatTurn, FragmentStream, LlmError, LlmResult};
use crate::protocol::ServerMessage;
use crate::state::{AppState, BotHandle};
use crate::types::*;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Fragments buffered between the provider task and the dispatcher
const FRAGMENT_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchState {
    Idle,
    Requesting,
    Streaming { deltas: usize },
    Completed { text: String },
    Failed { reason: String },
}

/// One pending bot reply
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub room: RoomCode,
    pub bot: BotHandle,
    /// Display name of the member who mentioned the bot
    pub member_name: String,
    pub prompt: String,
}

/// Context entry recording what a member asked
pub fn prompt_turn_text(member_name: &str, prompt: &str) -> String {
    format!("prompt from member {}: {}", member_name, prompt)
}

/// Context entry recording what a bot answered
pub fn response_turn_text(bot_name: &str, text: &str) -> String {
    format!("response from bot {}: {}", bot_name, text)
}

/// Forward provider fragments into the channel. Stops after an error, or
/// as soon as the consumer is gone, dropping (and so closing) the stream.
async fn pump(mut fragments: FragmentStream, tx: mpsc::Sender<LlmResult<String>>) {
    while let Some(fragment) = fragments.next().await {
        let failed = fragment.is_err();
        if tx.send(fragment).await.is_err() {
            tracing::debug!("Dispatch consumer gone, closing provider stream");
            return;
        }
        if failed {
            return;
        }
    }
}

impl Dispatch {
    fn author(&self) -> Author {
        Author::system(&self.bot.name)
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are {bot}, an assistant taking part in the collaborative chat room {room}. \
             Several people talk to you here; each of their turns starts with who is speaking. \
             {member} is asking you now. Be helpful and concise.",
            bot = self.bot.name,
            room = self.room,
            member = self.member_name,
        )
    }

    /// System turn, the bot's context so far, then the new prompt
    pub fn build_messages(&self, context: &[ContextTurn]) -> Vec<ChatTurn> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(ChatTurn::new(TurnRole::System, self.system_prompt()));
        messages.extend(context.iter().map(ChatTurn::from));
        messages.push(ChatTurn::new(
            TurnRole::User,
            prompt_turn_text(&self.member_name, &self.prompt),
        ));
        messages
    }

    fn transition(&self, from: &DispatchState, to: DispatchState) -> DispatchState {
        tracing::debug!(
            "Dispatch {}@{}: {:?} -> {:?}",
            self.bot.name,
            self.room,
            from,
            to
        );
        to
    }

    fn fail(&self, from: &DispatchState, reason: impl std::fmt::Display) -> DispatchState {
        tracing::error!(
            "Bot {} in room {} failed to answer: {}",
            self.bot.name,
            self.room,
            reason
        );
        self.transition(
            from,
            DispatchState::Failed {
                reason: reason.to_string(),
            },
        )
    }

    /// Run to a terminal state. Waits for any in-flight dispatch of the same
    /// bot first so context turns never interleave.
    pub async fn run(self, state: Arc<AppState>) -> DispatchState {
        let _gate = self.bot.gate.clone().lock_owned().await;
        let mut phase = DispatchState::Idle;

        phase = self.transition(&phase, DispatchState::Requesting);
        state
            .broadcast_to_room(
                &self.room,
                ServerMessage::LlmMessageStart(ChatMessage::new(self.author(), "")),
            )
            .await;

        let Some(llm) = state.llm.as_ref() else {
            return self.fail(&phase, "no LLM providers configured");
        };
        let Some(context) = state.rooms.bot_context(&self.room, &self.bot.id).await else {
            return self.fail(&phase, "bot is no longer in the room");
        };

        let request = state.llm_config.request(self.build_messages(&context));
        let idle_timeout = request.timeout;
        let fragments = match llm.stream_from_model(&self.bot.model, request).await {
            Ok(fragments) => fragments,
            Err(e) => return self.fail(&phase, e),
        };

        let (tx, mut rx) = mpsc::channel(FRAGMENT_BUFFER);
        tokio::spawn(pump(fragments, tx));

        let mut text = String::new();
        let mut deltas = 0;
        phase = self.transition(&phase, DispatchState::Streaming { deltas });

        loop {
            let next = match tokio::time::timeout(idle_timeout, rx.recv()).await {
                Ok(next) => next,
                Err(_) => return self.fail(&phase, LlmError::Timeout(idle_timeout)),
            };
            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => return self.fail(&phase, e),
                None => break,
            };

            if !state.rooms.contains(&self.room).await {
                // Dropping rx on return stops the producer
                return self.fail(&phase, "room closed while streaming");
            }

            deltas += 1;
            text.push_str(&fragment);
            phase = DispatchState::Streaming { deltas };
            state
                .broadcast_to_room(
                    &self.room,
                    ServerMessage::LlmMessage(ChatMessage::new(self.author(), fragment)),
                )
                .await;
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            return self.fail(&phase, LlmError::ParseError("empty response".to_string()));
        }

        let reply = ChatMessage::new(self.author(), text.clone());
        state
            .broadcast_to_room(&self.room, ServerMessage::Message(reply.clone()))
            .await;
        if let Err(e) = state.rooms.append_message(&self.room, reply).await {
            tracing::warn!("Reply from {} not stored: {}", self.bot.name, e);
        }

        let committed = state
            .rooms
            .append_bot_turns(
                &self.room,
                &self.bot.id,
                vec![
                    ContextTurn::user(prompt_turn_text(&self.member_name, &self.prompt)),
                    ContextTurn::assistant(response_turn_text(&self.bot.name, &text)),
                ],
            )
            .await;
        if !committed {
            tracing::warn!("Bot {} removed before its context was updated", self.bot.name);
        }

        state
            .broadcast_to_room(
                &self.room,
                ServerMessage::LlmMessageEnd(ChatMessage::new(self.author(), "")),
            )
            .await;

        tracing::info!(
            "Bot {} answered in room {} ({} fragments, {} chars)",
            self.bot.name,
            self.room,
            deltas,
            text.chars().count()
        );
        self.transition(&phase, DispatchState::Completed { text })
    }
}
