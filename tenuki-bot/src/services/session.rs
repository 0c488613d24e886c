//! Per-chat session object: a small pointer to the current record plus
//! flags. Not authoritative for board content.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::keys;
use crate::services::storage::BlobStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    #[serde(default)]
    pub game_id: Option<String>,
    /// 1 = black, 2 = white.
    #[serde(default = "default_turn")]
    pub current_turn: u8,
    #[serde(default)]
    pub engine_opponent_mode: bool,
}

fn default_turn() -> u8 {
    1
}

impl Default for Session {
    fn default() -> Self {
        Session {
            game_id: None,
            current_turn: 1,
            engine_opponent_mode: false,
        }
    }
}

/// Fields to change; everything left `None` is preserved as stored.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub game_id: Option<String>,
    pub current_turn: Option<u8>,
    pub engine_opponent_mode: Option<bool>,
}

pub struct SessionStore {
    store: Arc<dyn BlobStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        SessionStore { store }
    }

    /// Load the chat's session, or an empty one if none was ever written.
    pub async fn load(&self, chat: &str) -> Result<Session> {
        match self.store.get(&keys::session(chat)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| BotError::Store(format!("corrupt session for {chat}: {e}"))),
            Err(BotError::NotFound(_)) => Ok(Session::default()),
            Err(e) => Err(e),
        }
    }

    /// Merge-preserve update: read the stored session, apply only the set
    /// fields, write back. Setting `current_turn` must not clobber
    /// `engine_opponent_mode` and vice versa.
    pub async fn update(&self, chat: &str, patch: SessionPatch) -> Result<Session> {
        let mut session = self.load(chat).await?;
        if let Some(game_id) = patch.game_id {
            session.game_id = Some(game_id);
        }
        if let Some(turn) = patch.current_turn {
            session.current_turn = turn;
        }
        if let Some(mode) = patch.engine_opponent_mode {
            session.engine_opponent_mode = mode;
        }
        self.save(chat, &session).await?;
        Ok(session)
    }

    pub async fn save(&self, chat: &str, session: &Session) -> Result<()> {
        let bytes = serde_json::to_vec(session)
            .map_err(|e| BotError::Internal(format!("session encode: {e}")))?;
        self.store
            .put(
                &keys::session(chat),
                bytes,
                "application/json",
                Some(keys::CACHE_NO_STORE),
            )
            .await
    }
}
