use anyhow::{Context, Result};

/// Environment-driven configuration. Missing required values abort startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Messaging channel access token.
    pub channel_token: String,
    /// Blob bucket holding all per-chat state and artifacts.
    pub bucket: String,
    /// Bucket for opaque auth tokens; defaults to the main bucket.
    pub auth_bucket: String,
    /// Webhook route, e.g. "/webhook".
    pub webhook_path: String,
    pub port: u16,
    /// Base URL this service is reachable at; engine callbacks post here.
    pub callback_base_url: String,
    /// Companion review service endpoint; empty disables review dispatch.
    pub review_endpoint: Option<String>,
    /// Local engine binary for genmove and evaluation.
    pub katago_bin: String,
    pub katago_model: Option<String>,
    pub katago_gtp_config: Option<String>,
    pub katago_analysis_config: Option<String>,
    pub review_visits: u32,
    pub genmove_visits: u32,
    /// OpenAI-compatible chat completions endpoint.
    pub llm_endpoint: String,
    pub llm_api_key: String,
    pub llm_model: String,
    /// When set, `review` and `vs ai` require a matching stored token.
    pub auth_token: Option<String>,
    /// Storage API overrides (emulators, alternate endpoints).
    pub storage_endpoint: Option<String>,
    pub storage_token: Option<String>,
    /// Serialize requests per chat instead of last-writer-wins.
    pub serialize_chats: bool,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let bucket = required("STORAGE_BUCKET")?;
        Ok(Config {
            channel_token: required("LINE_CHANNEL_TOKEN")?,
            auth_bucket: optional("AUTH_BUCKET").unwrap_or_else(|| bucket.clone()),
            bucket,
            webhook_path: optional("WEBHOOK_PATH").unwrap_or_else(|| "/webhook".to_string()),
            port: optional("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            callback_base_url: required("CALLBACK_BASE_URL")?,
            review_endpoint: optional("REVIEW_ENDPOINT"),
            katago_bin: optional("KATAGO_BIN").unwrap_or_else(|| "katago".to_string()),
            katago_model: optional("KATAGO_MODEL"),
            katago_gtp_config: optional("KATAGO_GTP_CONFIG"),
            katago_analysis_config: optional("KATAGO_ANALYSIS_CONFIG"),
            review_visits: optional("REVIEW_VISITS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            genmove_visits: optional("GENMOVE_VISITS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(400),
            llm_endpoint: required("LLM_ENDPOINT")?,
            llm_api_key: required("LLM_API_KEY")?,
            llm_model: optional("LLM_MODEL").unwrap_or_else(|| "gpt-5-mini".to_string()),
            auth_token: optional("AUTH_TOKEN"),
            storage_endpoint: optional("STORAGE_ENDPOINT"),
            storage_token: optional("STORAGE_TOKEN"),
            serialize_chats: optional("SERIALIZE_CHATS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}
