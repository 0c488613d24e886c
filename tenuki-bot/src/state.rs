use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};

use crate::config::Config;
use crate::error::Result;
use crate::services::katago::EngineBackend;
use crate::services::llm::Commentator;
use crate::services::messaging::{BotIdentity, Messenger};
use crate::services::session::SessionStore;
use crate::services::storage::BlobStore;

/// Shared per-process state. Everything mutable lives behind the store or
/// one of the caches below; request handlers themselves hold nothing
/// across suspension points.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn BlobStore>,
    /// Auth tokens may live in a separate bucket.
    pub auth_store: Arc<dyn BlobStore>,
    pub sessions: Arc<SessionStore>,
    pub messenger: Arc<dyn Messenger>,
    pub engine: Arc<dyn EngineBackend>,
    pub commentator: Arc<dyn Commentator>,
    /// Lazily resolved bot identity, needed for group mentions.
    identity: Arc<OnceCell<BotIdentity>>,
    /// Optional per-chat serializer (see SERIALIZE_CHATS).
    chat_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn BlobStore>,
        auth_store: Arc<dyn BlobStore>,
        messenger: Arc<dyn Messenger>,
        engine: Arc<dyn EngineBackend>,
        commentator: Arc<dyn Commentator>,
    ) -> Self {
        AppState {
            config: Arc::new(config),
            sessions: Arc::new(SessionStore::new(Arc::clone(&store))),
            store,
            auth_store,
            messenger,
            engine,
            commentator,
            identity: Arc::new(OnceCell::new()),
            chat_locks: Arc::new(DashMap::new()),
        }
    }

    /// Bot user id + display name, fetched once on first use.
    pub async fn bot_identity(&self) -> Result<&BotIdentity> {
        self.identity
            .get_or_try_init(|| async { self.messenger.bot_identity().await })
            .await
    }

    /// When chat serialization is enabled, hold this guard for the whole
    /// request; otherwise concurrent webhooks race with last-writer-wins
    /// store semantics (the record stays consistent either way).
    pub async fn maybe_lock_chat(&self, chat: &str) -> Option<OwnedMutexGuard<()>> {
        if !self.config.serialize_chats {
            return None;
        }
        let lock = self
            .chat_locks
            .entry(chat.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Some(lock.lock_owned().await)
    }

    pub fn callback_url(&self, route: &str) -> String {
        format!(
            "{}/{}",
            self.config.callback_base_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }
}
