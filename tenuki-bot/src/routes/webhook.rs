//! Webhook entry: platform events in, command dispatch out.
//!
//! The platform retries on non-2xx, so this route answers `200 "OK"` no
//! matter what; handler failures are logged and swallowed.

use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;

use crate::commands::{self, Command, HELP_MESSAGE};
use crate::services::messaging::Message;
use crate::services::{play, review};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(rename = "replyToken")]
    pub reply_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "groupId")]
    pub group_id: Option<String>,
    #[serde(rename = "roomId")]
    pub room_id: Option<String>,
}

impl Source {
    /// All per-conversation state is keyed by this id.
    fn target_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or(self.room_id.as_deref())
            .or(self.user_id.as_deref())
    }

    fn is_group_like(&self) -> bool {
        matches!(self.kind.as_str(), "group" | "room")
    }
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
    pub mention: Option<Mention>,
}

#[derive(Debug, Deserialize)]
pub struct Mention {
    #[serde(default)]
    pub mentionees: Vec<Mentionee>,
}

#[derive(Debug, Deserialize)]
pub struct Mentionee {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub length: usize,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "isSelf", default)]
    pub is_self: bool,
}

/// Deliberately takes raw bytes: the platform retries on anything but a
/// 2xx, so even an unparsable body must come back `200 "OK"`.
pub async fn handle(
    State(state): State<AppState>,
    body: Bytes,
) -> (axum::http::StatusCode, &'static str) {
    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(error = %e, "unparsable webhook body");
            return (axum::http::StatusCode::OK, "OK");
        }
    };

    for event in envelope.events {
        if let Err(e) = process_event(&state, event).await {
            tracing::error!(error = %e, "webhook event failed");
        }
    }
    (axum::http::StatusCode::OK, "OK")
}

async fn process_event(state: &AppState, event: Event) -> crate::error::Result<()> {
    if event.kind != "message" {
        return Ok(());
    }
    let Some(source) = event.source else {
        return Ok(());
    };
    let Some(target) = source.target_id().map(str::to_string) else {
        return Ok(());
    };
    let Some(message) = event.message else {
        return Ok(());
    };
    let reply_token = event.reply_token.as_deref();

    let _guard = state.maybe_lock_chat(&target).await;

    match message.kind.as_str() {
        "text" => {
            let Some(raw_text) = message.text.as_deref() else {
                return Ok(());
            };
            let Some(text) =
                resolve_addressed_text(state, &source, raw_text, message.mention.as_ref()).await
            else {
                return Ok(());
            };
            dispatch_text(state, &target, reply_token, &text).await
        }
        "file" => {
            let (Some(id), Some(name)) = (message.id.as_deref(), message.file_name.as_deref())
            else {
                return Ok(());
            };
            review::handle_upload(state, &target, reply_token, id, name).await
        }
        _ => Ok(()),
    }
}

/// In group/room chats the bot only acts when addressed: a textual
/// `@DisplayName` prefix or a mention payload naming the bot. Mention
/// spans are stripped before command parsing. Direct chats pass through.
async fn resolve_addressed_text(
    state: &AppState,
    source: &Source,
    text: &str,
    mention: Option<&Mention>,
) -> Option<String> {
    if !source.is_group_like() {
        return Some(text.trim().to_string());
    }

    let identity = match state.bot_identity().await {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::error!(error = %e, "could not resolve bot identity");
            None
        }
    };

    if let Some(identity) = identity {
        if let Some(stripped) = commands::strip_text_mention(text, &identity.display_name) {
            return Some(stripped);
        }
    }

    let mention = mention?;
    let bot_user_id = identity.map(|i| i.user_id.as_str());
    let addressed = mention
        .mentionees
        .iter()
        .any(|m| m.is_self || (bot_user_id.is_some() && m.user_id.as_deref() == bot_user_id));
    if !addressed {
        return None;
    }

    let spans = mention
        .mentionees
        .iter()
        .map(|m| (m.index, m.length))
        .collect();
    Some(commands::strip_mention_spans(text, spans))
}

async fn dispatch_text(
    state: &AppState,
    target: &str,
    reply_token: Option<&str>,
    text: &str,
) -> crate::error::Result<()> {
    let Some(command) = commands::parse(text) else {
        // Plain conversation; stay quiet.
        return Ok(());
    };
    tracing::info!(target, ?command, "dispatching command");

    match command {
        Command::Help => {
            state
                .messenger
                .send(target, reply_token, vec![Message::text(HELP_MESSAGE)])
                .await?;
            Ok(())
        }
        Command::Auth { token } => play::handle_auth(state, target, reply_token, &token).await,
        Command::Review => review::handle_review_command(state, target, reply_token).await,
        Command::Evaluation => play::handle_evaluation(state, target, reply_token).await,
        Command::Undo => play::handle_undo(state, target, reply_token).await,
        Command::Load => play::handle_load(state, target, reply_token).await,
        Command::LoadGame { game_id } => {
            play::handle_load_game(state, target, reply_token, &game_id).await
        }
        Command::LoadGameMoves { game_id, count } => {
            play::handle_load_game_moves(state, target, reply_token, &game_id, count).await
        }
        Command::Reset => play::handle_reset(state, target, reply_token).await,
        Command::VsStatus => play::handle_vs_status(state, target, reply_token).await,
        Command::VsAi => play::handle_vs_ai(state, target, reply_token).await,
        Command::VsFree => play::handle_vs_free(state, target, reply_token).await,
        Command::Move { coord } => play::handle_move(state, target, reply_token, &coord).await,
    }
}
