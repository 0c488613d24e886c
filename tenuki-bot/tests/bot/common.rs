#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use go_engine::Record;

use tenuki_bot::config::Config;
use tenuki_bot::error::Result;
use tenuki_bot::keys;
use tenuki_bot::services::katago::stats::MoveStat;
use tenuki_bot::services::katago::{
    EngineBackend, Evaluation, GenmoveRequest, ReviewRequest,
};
use tenuki_bot::services::llm::{Commentator, MoveComment};
use tenuki_bot::services::messaging::{BotIdentity, Message, Messenger};
use tenuki_bot::services::storage::{BlobStore, MemoryStore};
use tenuki_bot::AppState;

pub const CHAT: &str = "U_test_user";

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SendRecord {
    pub target: String,
    pub reply_token: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Default)]
pub struct RecordingMessenger {
    pub sends: Mutex<Vec<SendRecord>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingMessenger {
    pub fn recorded(&self) -> Vec<SendRecord> {
        self.sends.lock().unwrap().clone()
    }

    pub fn register_file(&self, message_id: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(message_id.to_string(), bytes);
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(
        &self,
        target: &str,
        reply_token: Option<&str>,
        messages: Vec<Message>,
    ) -> Result<bool> {
        let used_reply = reply_token.is_some();
        self.sends.lock().unwrap().push(SendRecord {
            target: target.to_string(),
            reply_token: reply_token.map(str::to_string),
            messages,
        });
        Ok(used_reply)
    }

    async fn bot_identity(&self) -> Result<BotIdentity> {
        Ok(BotIdentity {
            user_id: "U_bot".to_string(),
            display_name: "GoBot".to_string(),
        })
    }

    async fn fetch_file(&self, message_id: &str) -> Result<Vec<u8>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockEngine {
    pub reviews: Mutex<Vec<ReviewRequest>>,
    pub genmoves: Mutex<Vec<GenmoveRequest>>,
    pub evaluation: Mutex<Evaluation>,
}

impl MockEngine {
    pub fn recorded_reviews(&self) -> Vec<ReviewRequest> {
        self.reviews.lock().unwrap().clone()
    }

    pub fn recorded_genmoves(&self) -> Vec<GenmoveRequest> {
        self.genmoves.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineBackend for MockEngine {
    async fn dispatch_review(&self, req: ReviewRequest) -> Result<()> {
        self.reviews.lock().unwrap().push(req);
        Ok(())
    }

    async fn dispatch_genmove(&self, req: GenmoveRequest) -> Result<()> {
        self.genmoves.lock().unwrap().push(req);
        Ok(())
    }

    async fn evaluate(&self, _record: &Record) -> Result<Evaluation> {
        Ok(self.evaluation.lock().unwrap().clone())
    }
}

pub struct MockCommentator;

#[async_trait]
impl Commentator for MockCommentator {
    async fn comment(&self, key_moves: &[MoveStat]) -> Result<Vec<MoveComment>> {
        Ok(key_moves
            .iter()
            .map(|s| MoveComment {
                move_index: s.move_index,
                comment: format!("Commentary for move {}.", s.move_index),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Test context
// ---------------------------------------------------------------------------

pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub messenger: Arc<RecordingMessenger>,
    pub engine: Arc<MockEngine>,
}

pub fn test_config(auth_token: Option<&str>) -> Config {
    Config {
        channel_token: "channel-token".to_string(),
        bucket: "test-bucket".to_string(),
        auth_bucket: "test-bucket".to_string(),
        webhook_path: "/webhook".to_string(),
        port: 0,
        callback_base_url: "http://localhost:8080".to_string(),
        review_endpoint: Some("http://review.test/analyze".to_string()),
        katago_bin: "katago".to_string(),
        katago_model: None,
        katago_gtp_config: None,
        katago_analysis_config: None,
        review_visits: 1000,
        genmove_visits: 400,
        llm_endpoint: "http://llm.test/v1".to_string(),
        llm_api_key: "k".to_string(),
        llm_model: "test-model".to_string(),
        auth_token: auth_token.map(str::to_string),
        storage_endpoint: None,
        storage_token: None,
        serialize_chats: false,
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config(None))
    }

    pub fn with_auth_token(token: &str) -> Self {
        Self::with_config(test_config(Some(token)))
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let engine = Arc::new(MockEngine::default());
        let state = AppState::new(
            config,
            Arc::clone(&store) as Arc<dyn BlobStore>,
            Arc::clone(&store) as Arc<dyn BlobStore>,
            Arc::clone(&messenger) as Arc<dyn Messenger>,
            Arc::clone(&engine) as Arc<dyn EngineBackend>,
            Arc::new(MockCommentator),
        );
        TestContext {
            state,
            store,
            messenger,
            engine,
        }
    }

    /// Store a record for the chat under the given game id.
    pub async fn seed_record(&self, chat: &str, game_id: &str, record: &Record) {
        self.store
            .put(
                &keys::game_record(chat, game_id),
                record.encode().into_bytes(),
                "application/x-go-sgf",
                None,
            )
            .await
            .unwrap();
    }

    pub fn sends(&self) -> Vec<SendRecord> {
        self.messenger.recorded()
    }

    pub fn last_send(&self) -> SendRecord {
        self.messenger
            .recorded()
            .last()
            .cloned()
            .expect("no messages were sent")
    }
}

// ---------------------------------------------------------------------------
// Assertions on messages
// ---------------------------------------------------------------------------

pub fn text_of(message: &Message) -> Option<&str> {
    match message {
        Message::Text { text } => Some(text),
        _ => None,
    }
}

pub fn is_image(message: &Message) -> bool {
    matches!(message, Message::Image { .. })
}

pub fn flex_contents(message: &Message) -> Option<&serde_json::Value> {
    match message {
        Message::Flex { contents, .. } => Some(contents),
        _ => None,
    }
}

/// Build a legal record of `n` moves: alternating colors along sparse rows
/// so no captures ever happen.
pub fn record_with_moves(n: usize) -> Record {
    use go_engine::Stone;
    let mut record = Record::new();
    for i in 0..n {
        let row = (i / 19) as u8 * 2;
        let col = (i % 19) as u8;
        let stone = if i % 2 == 0 { Stone::Black } else { Stone::White };
        record.append_move(stone, (row, col));
    }
    record
}
