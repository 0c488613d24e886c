//! LLM commentator: key-move list in, JSON array of comments out.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BotError, Result};
use crate::services::katago::stats::MoveStat;

const SYSTEM_PROMPT: &str = "\
You are a Go strategy commentator. The user supplies game history data as a \
JSON array; each object describes one move: `move` (ply number), `color` \
(B/W), `played` (the coordinate played), `engine_best` (the engine's \
recommendation), `pv` (the engine's expected continuation), \
`winrate_before` / `winrate_after` (black's winning percentage before and \
after the move), and `score_loss` (points given up against the engine's \
best move; larger is worse).

For every move, write a short natural-language comment that: explains \
whether the move helped or hurt and by roughly how much, mentions the \
winrate change (e.g. \"black's winning chances fell from 50% to 40%\"), and \
suggests what the engine's recommendation would have achieved. Refer to \
the continuation as the engine's suggested line and only name its first \
move. Describe the size of the mistake in words rather than quoting \
score_loss.

Reply with NOTHING but a JSON array, one element per move, in this exact \
shape:
[
  {\"move\": <ply number>, \"comment\": \"<your comment>\"}
]
Every move must get a comment, even quiet ones.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveComment {
    #[serde(rename = "move")]
    pub move_index: u32,
    pub comment: String,
}

#[async_trait]
pub trait Commentator: Send + Sync {
    async fn comment(&self, key_moves: &[MoveStat]) -> Result<Vec<MoveComment>>;
}

pub struct OpenAiCommentator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCommentator {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|e| BotError::Llm(e.to_string()))?;
        Ok(OpenAiCommentator {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Commentator for OpenAiCommentator {
    async fn comment(&self, key_moves: &[MoveStat]) -> Result<Vec<MoveComment>> {
        let data = serde_json::to_string_pretty(key_moves)
            .map_err(|e| BotError::Internal(e.to_string()))?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": format!("Data:\n\n{data}") },
            ],
            "max_completion_tokens": 10_000,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Llm(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BotError::Llm(format!(
                "completion failed: {}",
                resp.status()
            )));
        }
        let chat: ChatResponse = resp.json().await.map_err(|e| BotError::Llm(e.to_string()))?;
        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BotError::Llm("empty completion".to_string()))?;
        if choice.finish_reason.as_deref() != Some("stop") {
            return Err(BotError::Llm("completion truncated".to_string()));
        }
        let content = choice.message.content.unwrap_or_default();
        parse_comments(&content)
    }
}

/// Tolerant extraction of the comment array: a bare JSON array, an object
/// wrapping one under `moves`/`comments`/`data`, or the first `[...]`
/// substring of a chatty reply.
pub fn parse_comments(content: &str) -> Result<Vec<MoveComment>> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        if let Some(comments) = comments_from_value(&value) {
            return Ok(comments);
        }
    }
    let start = content.find('[');
    let end = content.rfind(']');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&content[start..=end]) {
                if let Some(comments) = comments_from_value(&value) {
                    return Ok(comments);
                }
            }
        }
    }
    Err(BotError::Llm("reply was not a comment array".to_string()))
}

fn comments_from_value(value: &Value) -> Option<Vec<MoveComment>> {
    let array = match value {
        Value::Array(_) => value,
        Value::Object(map) => ["moves", "comments", "data"]
            .iter()
            .find_map(|k| map.get(*k).filter(|v| v.is_array()))?,
        _ => return None,
    };
    serde_json::from_value(array.clone()).ok()
}
