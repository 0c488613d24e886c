//! Auth gate: an opaque per-chat token stored as a blob, compared against
//! the globally configured token. With no global token the gated commands
//! are open.

use crate::error::{BotError, Result};
use crate::keys;
use crate::state::AppState;

pub async fn store_token(state: &AppState, chat: &str, token: &str) -> Result<()> {
    state
        .auth_store
        .put(
            &keys::auth_token(chat),
            token.as_bytes().to_vec(),
            "text/plain",
            Some(keys::CACHE_NO_STORE),
        )
        .await
}

/// Whether this chat may use the gated commands (`review`, `vs ai`).
pub async fn is_authorized(state: &AppState, chat: &str) -> Result<bool> {
    let Some(expected) = state.config.auth_token.as_deref() else {
        return Ok(true);
    };
    match state.auth_store.get_text(&keys::auth_token(chat)).await {
        Ok(stored) => Ok(stored.trim() == expected),
        Err(BotError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

pub const AUTH_PROMPT: &str =
    "Please authenticate first: send \"auth <token>\" with your access token.";
