//! Compute-engine client: full-game review dispatch, single-move
//! generation, and live positional evaluation.
//!
//! Review runs on a companion service that reads the record from the blob
//! store by path and posts its result to `/callback/review`. Genmove runs
//! the local engine binary in a spawned task and posts to
//! `/callback/get_ai_next_move`; the reply token and the user's board
//! image URL travel inside the request so the callback needs no in-memory
//! correlation state.

pub mod gtp;
pub mod stats;

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use go_engine::{coord, Record, Stone};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::Config;
use crate::error::{BotError, Result};
use crate::services::storage::BlobStore;

use stats::AnalysisBlock;

const EVALUATION_DEADLINE: Duration = Duration::from_secs(180);
/// Final callback delivery may take a long while on a loaded service.
const CALLBACK_DELIVERY_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub task_id: String,
    pub target_id: String,
    /// Record object path; the companion reads it from the store itself.
    pub record_path: String,
    pub visits: u32,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct GenmoveRequest {
    pub target_chat: String,
    pub record_path: String,
    /// Side to generate for: 1 = black, 2 = white.
    pub current_turn: u8,
    pub reply_token: Option<String>,
    pub user_board_image_url: Option<String>,
    pub callback_url: String,
}

/// Body of `POST /callback/review`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCallback {
    pub task_id: String,
    pub status: String,
    pub target_id: String,
    #[serde(default)]
    pub result_paths: Option<ResultPaths>,
    #[serde(default)]
    pub move_stats: Option<Vec<stats::MoveStat>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPaths {
    #[serde(default)]
    pub json_gcs_path: Option<String>,
}

/// Body of `POST /callback/get_ai_next_move`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenmoveCallback {
    pub status: String,
    pub target_id: String,
    #[serde(default)]
    pub r#move: Option<String>,
    pub current_turn: u8,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub user_board_image_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Live positional estimate, black-positive.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub score_lead: Option<f64>,
    /// Per-intersection ownership in row-major board order, [-1, 1].
    pub ownership: Option<Vec<f64>>,
}

#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Kick off a full-game review; completion arrives on the callback
    /// route, possibly many minutes later.
    async fn dispatch_review(&self, req: ReviewRequest) -> Result<()>;

    /// Kick off single-move generation; completion arrives on the genmove
    /// callback route. Returns once the work is scheduled.
    async fn dispatch_genmove(&self, req: GenmoveRequest) -> Result<()>;

    /// Synchronous (bounded) evaluation of the current position.
    async fn evaluate(&self, record: &Record) -> Result<Evaluation>;
}

// ---------------------------------------------------------------------------
// Local engine binary + companion review service
// ---------------------------------------------------------------------------

pub struct LocalEngine {
    store: Arc<dyn BlobStore>,
    client: reqwest::Client,
    callback_client: reqwest::Client,
    config: Config,
}

impl LocalEngine {
    pub fn new(store: Arc<dyn BlobStore>, config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BotError::Engine(e.to_string()))?;
        let callback_client = reqwest::Client::builder()
            .timeout(CALLBACK_DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| BotError::Engine(e.to_string()))?;
        Ok(LocalEngine {
            store,
            client,
            callback_client,
            config,
        })
    }
}

#[async_trait]
impl EngineBackend for LocalEngine {
    async fn dispatch_review(&self, req: ReviewRequest) -> Result<()> {
        let endpoint = self
            .config
            .review_endpoint
            .as_deref()
            .ok_or_else(|| BotError::Engine("review backend not configured".to_string()))?;
        let resp = self
            .client
            .post(endpoint)
            .json(&req)
            .send()
            .await
            .map_err(|e| BotError::Engine(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BotError::Engine(format!(
                "review dispatch failed: {}",
                resp.status()
            )));
        }
        tracing::info!(task_id = %req.task_id, "review dispatched");
        Ok(())
    }

    async fn dispatch_genmove(&self, req: GenmoveRequest) -> Result<()> {
        let store = Arc::clone(&self.store);
        let client = self.callback_client.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let side = Stone::from_turn_index(req.current_turn).unwrap_or(Stone::Black);
            let result = run_genmove(&store, &config, &req.record_path, side).await;
            let payload = match result {
                Ok(mv) => GenmoveCallback {
                    status: "success".to_string(),
                    target_id: req.target_chat.clone(),
                    r#move: Some(mv),
                    current_turn: req.current_turn,
                    reply_token: req.reply_token.clone(),
                    user_board_image_url: req.user_board_image_url.clone(),
                    error: None,
                },
                Err(e) => GenmoveCallback {
                    status: "failed".to_string(),
                    target_id: req.target_chat.clone(),
                    r#move: None,
                    current_turn: req.current_turn,
                    reply_token: req.reply_token.clone(),
                    user_board_image_url: req.user_board_image_url.clone(),
                    error: Some(e.to_string()),
                },
            };
            if let Err(e) = client.post(&req.callback_url).json(&payload).send().await {
                tracing::error!(error = %e, "genmove callback delivery failed");
            }
        });
        Ok(())
    }

    async fn evaluate(&self, record: &Record) -> Result<Evaluation> {
        let query = analysis_query(record, self.config.review_visits, true);
        let blocks = run_analysis_query(&self.config, &query).await?;
        let block = blocks
            .last()
            .ok_or_else(|| BotError::Engine("no evaluation response".to_string()))?;

        let player = block.root_info.current_player.as_str();
        let sign = if player == "B" { 1.0 } else { -1.0 };
        Ok(Evaluation {
            score_lead: block.root_info.score_lead.map(|s| s * sign),
            ownership: block
                .ownership
                .as_ref()
                .map(|o| o.iter().map(|v| v * sign).collect()),
        })
    }
}

async fn run_genmove(
    store: &Arc<dyn BlobStore>,
    config: &Config,
    record_path: &str,
    side: Stone,
) -> Result<String> {
    let text = store.get_text(record_path).await?;
    let record = Record::decode(&text).map_err(|e| BotError::Engine(e.to_string()))?;
    gtp::genmove(
        &config.katago_bin,
        config.katago_model.as_deref(),
        config.katago_gtp_config.as_deref(),
        config.genmove_visits,
        &record,
        side,
    )
    .await
}

/// Build the analysis-mode query for the whole record. `last_only`
/// restricts the analysis to the final position (used by evaluation).
pub fn analysis_query(record: &Record, visits: u32, last_only: bool) -> serde_json::Value {
    let moves: Vec<[String; 2]> = record
        .moves()
        .filter_map(|m| {
            m.board_pos()
                .map(|pt| [m.stone.letter().to_string(), coord::display(pt)])
        })
        .collect();
    let analyze_turns: Vec<usize> = if last_only {
        vec![moves.len()]
    } else {
        (0..=moves.len()).collect()
    };
    let root = record.root();
    serde_json::json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "moves": moves,
        "rules": root.rules.clone().unwrap_or_else(|| "tromp-taylor".to_string()),
        "komi": root.komi,
        "boardXSize": 19,
        "boardYSize": 19,
        "maxVisits": visits,
        "analyzeTurns": analyze_turns,
        "includeOwnership": last_only,
    })
}

async fn run_analysis_query(
    config: &Config,
    query: &serde_json::Value,
) -> Result<Vec<AnalysisBlock>> {
    let mut cmd = Command::new(&config.katago_bin);
    cmd.arg("analysis");
    if let Some(model) = &config.katago_model {
        cmd.args(["-model", model]);
    }
    if let Some(analysis_config) = &config.katago_analysis_config {
        cmd.args(["-config", analysis_config]);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| BotError::Engine(format!("failed to spawn engine: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| BotError::Engine("failed to open engine stdin".to_string()))?;
    let line = format!("{query}\n");
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| BotError::Engine(e.to_string()))?;
    drop(stdin);

    let output = tokio::time::timeout(EVALUATION_DEADLINE, child.wait_with_output())
        .await
        .map_err(|_| BotError::Engine("evaluation timed out".to_string()))?
        .map_err(|e| BotError::Engine(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BotError::Engine(format!(
            "engine exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let blocks = stats::parse_analysis_output(&stdout);
    if blocks.is_empty() {
        return Err(BotError::Engine("no analysis output".to_string()));
    }
    Ok(blocks)
}
