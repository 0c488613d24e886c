//! Messaging adapter: reply-then-push fallback and rich-card batching.
//!
//! Replies are free; pushes count against the platform quota, so every
//! handler tries the reply token first. A reply token is single-use and
//! expires, so an expiry (platform status 400/410) silently falls back to
//! push.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BotError, Result};

const LINE_API: &str = "https://api.line.me/v2/bot";
const LINE_DATA_API: &str = "https://api-data.line.me/v2/bot";

/// Platform carousels cap out at 12 bubbles; 10 keeps a safety margin.
pub const MAX_BUBBLES_PER_CAROUSEL: usize = 10;
/// Pacing between carousel batches and between fallback texts.
pub const CAROUSEL_BATCH_DELAY: Duration = Duration::from_secs(1);
pub const FALLBACK_TEXT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        original_content_url: String,
        preview_image_url: String,
    },
    #[serde(rename_all = "camelCase")]
    Flex {
        alt_text: String,
        contents: Value,
    },
}

impl Message {
    pub fn text(text: impl Into<String>) -> Message {
        Message::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Message {
        let url = url.into();
        Message::Image {
            original_content_url: url.clone(),
            preview_image_url: url,
        }
    }

    pub fn flex(alt_text: impl Into<String>, contents: Value) -> Message {
        Message::Flex {
            alt_text: alt_text.into(),
            contents,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub user_id: String,
    pub display_name: String,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `messages` to `target`, preferring the reply token when given.
    /// Returns true when the reply token was consumed.
    async fn send(
        &self,
        target: &str,
        reply_token: Option<&str>,
        messages: Vec<Message>,
    ) -> Result<bool>;

    async fn bot_identity(&self) -> Result<BotIdentity>;

    /// Download user-uploaded file content by message id.
    async fn fetch_file(&self, message_id: &str) -> Result<Vec<u8>>;
}

/// Group flex bubbles into carousels of at most ten and send them with a
/// one-second gap. Each batch is a single platform call.
pub async fn send_carousels(
    messenger: &dyn Messenger,
    target: &str,
    bubbles: Vec<Value>,
) -> Result<()> {
    let total = bubbles.len();
    for (batch_index, batch) in bubbles.chunks(MAX_BUBBLES_PER_CAROUSEL).enumerate() {
        let start = batch_index * MAX_BUBBLES_PER_CAROUSEL + 1;
        let end = start + batch.len() - 1;
        let carousel = serde_json::json!({
            "type": "carousel",
            "contents": batch,
        });
        let alt = format!("Key move analysis ({start}-{end}/{total})");
        messenger
            .send(target, None, vec![Message::flex(alt, carousel)])
            .await?;
        if end < total {
            tokio::time::sleep(CAROUSEL_BATCH_DELAY).await;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LINE implementation
// ---------------------------------------------------------------------------

pub struct LineMessenger {
    client: reqwest::Client,
    channel_token: String,
}

#[derive(Deserialize)]
struct BotInfoResponse {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "displayName")]
    display_name: String,
}

impl LineMessenger {
    pub fn new(channel_token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BotError::Transport(e.to_string()))?;
        Ok(LineMessenger {
            client,
            channel_token: channel_token.to_string(),
        })
    }

    async fn post(&self, url: &str, body: Value) -> Result<reqwest::StatusCode> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.channel_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Transport(e.to_string()))?;
        Ok(resp.status())
    }
}

#[async_trait]
impl Messenger for LineMessenger {
    async fn send(
        &self,
        target: &str,
        reply_token: Option<&str>,
        messages: Vec<Message>,
    ) -> Result<bool> {
        let count = messages.len();
        if let Some(token) = reply_token.filter(|t| !t.is_empty()) {
            let status = self
                .post(
                    &format!("{LINE_API}/message/reply"),
                    serde_json::json!({ "replyToken": token, "messages": &messages }),
                )
                .await?;
            if status.is_success() {
                tracing::info!(target, count, "sent reply message");
                return Ok(true);
            }
            // Expired or already-used token: fall back to push.
            if status != reqwest::StatusCode::BAD_REQUEST && status != reqwest::StatusCode::GONE {
                return Err(BotError::Transport(format!("reply failed: {status}")));
            }
            tracing::warn!(target, "reply token expired, falling back to push");
        }

        let status = self
            .post(
                &format!("{LINE_API}/message/push"),
                serde_json::json!({ "to": target, "messages": &messages }),
            )
            .await?;
        if !status.is_success() {
            return Err(BotError::Transport(format!("push failed: {status}")));
        }
        tracing::info!(target, count, "sent push message");
        Ok(false)
    }

    async fn bot_identity(&self) -> Result<BotIdentity> {
        let resp = self
            .client
            .get(format!("{LINE_API}/info"))
            .bearer_auth(&self.channel_token)
            .send()
            .await
            .map_err(|e| BotError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BotError::Transport(format!(
                "bot info failed: {}",
                resp.status()
            )));
        }
        let info: BotInfoResponse = resp
            .json()
            .await
            .map_err(|e| BotError::Transport(e.to_string()))?;
        Ok(BotIdentity {
            user_id: info.user_id,
            display_name: info.display_name,
        })
    }

    async fn fetch_file(&self, message_id: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(format!("{LINE_DATA_API}/message/{message_id}/content"))
            .bearer_auth(&self.channel_token)
            .send()
            .await
            .map_err(|e| BotError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BotError::Transport(format!(
                "content fetch failed: {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BotError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wire_shapes() {
        let text = serde_json::to_value(Message::text("hi")).unwrap();
        assert_eq!(text, serde_json::json!({"type": "text", "text": "hi"}));

        let image = serde_json::to_value(Message::image("https://x/a.png")).unwrap();
        assert_eq!(
            image,
            serde_json::json!({
                "type": "image",
                "originalContentUrl": "https://x/a.png",
                "previewImageUrl": "https://x/a.png",
            })
        );

        let flex =
            serde_json::to_value(Message::flex("alt", serde_json::json!({"type": "carousel"})))
                .unwrap();
        assert_eq!(flex["type"], "flex");
        assert_eq!(flex["altText"], "alt");
    }
}
