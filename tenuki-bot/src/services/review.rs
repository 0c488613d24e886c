//! Review orchestrator: upload -> engine -> key moves -> commentary ->
//! media -> fan-out delivery.
//!
//! The command handler only dispatches and acknowledges; the heavy
//! pipeline runs when the engine's completion callback arrives, re-reading
//! everything it needs from the store.

use chrono::Utc;
use go_engine::{coord, Board, Stone};
use serde_json::{json, Value};

use crate::error::{BotError, Result};
use crate::keys;
use crate::services::auth;
use crate::services::katago::stats::{
    derive_move_stats, parse_analysis_output, select_key_moves, MoveStat,
};
use crate::services::katago::{ReviewCallback, ReviewRequest};
use crate::services::llm::MoveComment;
use crate::services::messaging::{self, Message, FALLBACK_TEXT_DELAY};
use crate::services::render::{self, BoardSpec, Mark};
use crate::state::AppState;

/// Pipeline stages, used for tracing only; control flow is sequential.
#[derive(Debug, Clone, Copy)]
enum ReviewStage {
    Queued,
    EngineDone,
    LlmRunning,
    LlmDone,
    MediaSynthesizing,
    Delivering,
    Complete,
    FailNotify,
}

const COMMENT_LIMIT: usize = 500;

fn color_word(color: &str) -> &'static str {
    if color == "W" { "white" } else { "black" }
}

fn stat_stone(stat: &MoveStat) -> Stone {
    if stat.color == "W" {
        Stone::White
    } else {
        Stone::Black
    }
}

// ---------------------------------------------------------------------------
// Upload + trigger
// ---------------------------------------------------------------------------

/// A user-uploaded record file. Anything that is not a record is ignored.
pub async fn handle_upload(
    state: &AppState,
    chat: &str,
    reply_token: Option<&str>,
    message_id: &str,
    file_name: &str,
) -> Result<()> {
    if !file_name
        .to_ascii_lowercase()
        .ends_with(&format!(".{}", keys::RECORD_EXT))
    {
        return Ok(());
    }
    let bytes = state.messenger.fetch_file(message_id).await?;
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    let path = keys::review_upload(chat, stem, Utc::now().timestamp());
    state
        .store
        .put(&path, bytes, "application/x-go-sgf", None)
        .await?;
    tracing::info!(chat, %path, "record uploaded");

    state
        .messenger
        .send(
            chat,
            reply_token,
            vec![Message::text(format!(
                "Record saved!\n\nFile: {file_name}\n\nSend \"review\" to run a deep analysis."
            ))],
        )
        .await?;
    Ok(())
}

/// The `review` command: resolve the newest upload, dispatch the engine,
/// acknowledge with an ETA on the reply token.
pub async fn handle_review_command(
    state: &AppState,
    chat: &str,
    reply_token: Option<&str>,
) -> Result<()> {
    if !auth::is_authorized(state, chat).await? {
        state
            .messenger
            .send(chat, reply_token, vec![Message::text(auth::AUTH_PROMPT)])
            .await?;
        return Ok(());
    }

    let latest = state
        .store
        .latest_by_creation(
            &keys::reviews_prefix(chat),
            Some(&format!(".{}", keys::RECORD_EXT)),
        )
        .await?;
    let Some(record_path) = latest else {
        state
            .messenger
            .send(
                chat,
                reply_token,
                vec![Message::text(
                    "No record found. Upload an SGF file first, then send \"review\".",
                )],
            )
            .await?;
        return Ok(());
    };

    let task_id = keys::task_id_from_upload(&record_path)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let file_name = record_path.rsplit('/').next().unwrap_or(&record_path);

    let request = ReviewRequest {
        task_id: task_id.clone(),
        target_id: chat.to_string(),
        record_path: record_path.clone(),
        visits: state.config.review_visits,
        callback_url: state.callback_url("/callback/review"),
    };
    if let Err(e) = state.engine.dispatch_review(request).await {
        state
            .messenger
            .send(
                chat,
                reply_token,
                vec![Message::text(format!("Could not start the review: {e}"))],
            )
            .await?;
        return Ok(());
    }
    tracing::info!(chat, %task_id, stage = ?ReviewStage::Queued, "review dispatched");

    state
        .messenger
        .send(
            chat,
            reply_token,
            vec![Message::text(format!(
                "Starting a deep review of {file_name}. The engine needs about 10 minutes; \
                 results will be posted here when they are ready."
            ))],
        )
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Callback pipeline
// ---------------------------------------------------------------------------

pub async fn process_review_callback(state: &AppState, cb: ReviewCallback) -> Result<()> {
    let chat = cb.target_id.as_str();
    let task_id = cb.task_id.as_str();

    if cb.status != "success" {
        let error = cb.error.unwrap_or_else(|| "unknown error".to_string());
        tracing::error!(chat, task_id, %error, stage = ?ReviewStage::FailNotify, "engine review failed");
        state
            .messenger
            .send(
                chat,
                None,
                vec![Message::text(format!("Engine review failed: {error}"))],
            )
            .await?;
        return Ok(());
    }
    tracing::info!(chat, task_id, stage = ?ReviewStage::EngineDone, "review callback received");

    let stats = match resolve_stats(state, &cb).await {
        Ok(stats) if !stats.is_empty() => stats,
        Ok(_) | Err(BotError::NotFound(_)) => {
            state
                .messenger
                .send(
                    chat,
                    None,
                    vec![Message::text(
                        "The review finished but its result data could not be read.",
                    )],
                )
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    // The derived stats are the durable task result.
    let stats_json =
        serde_json::to_vec(&stats).map_err(|e| BotError::Internal(e.to_string()))?;
    state
        .store
        .put(
            &keys::review_stats(chat, task_id),
            stats_json,
            "application/json",
            Some(keys::CACHE_NO_CACHE),
        )
        .await?;

    state
        .messenger
        .send(
            chat,
            None,
            vec![Message::text(format!(
                "Engine review complete! {} moves analyzed.\n\n\
                 Generating commentary for the key moves now, about one more minute.",
                stats.len()
            ))],
        )
        .await?;

    let key_moves = select_key_moves(&stats);

    tracing::info!(chat, task_id, key = key_moves.len(), stage = ?ReviewStage::LlmRunning, "requesting commentary");
    let comments = if key_moves.is_empty() {
        Vec::new()
    } else {
        match state.commentator.comment(&key_moves).await {
            Ok(comments) => comments,
            Err(e) => {
                tracing::error!(chat, task_id, error = %e, "commentary failed");
                state
                    .messenger
                    .send(
                        chat,
                        None,
                        vec![Message::text(format!(
                            "Commentary generation failed, aborting the review delivery: {e}"
                        ))],
                    )
                    .await?;
                return Ok(());
            }
        }
    };
    tracing::info!(chat, task_id, stage = ?ReviewStage::LlmDone, "commentary ready");

    deliver(state, chat, task_id, &stats, &key_moves, &comments).await?;
    tracing::info!(chat, task_id, stage = ?ReviewStage::Complete, "review delivered");
    Ok(())
}

/// Stats either arrive embedded in the callback or are derived from the
/// raw engine output stored under the given path.
async fn resolve_stats(state: &AppState, cb: &ReviewCallback) -> Result<Vec<MoveStat>> {
    if let Some(stats) = &cb.move_stats {
        return Ok(stats.clone());
    }
    let path = cb
        .result_paths
        .as_ref()
        .and_then(|p| p.json_gcs_path.as_deref())
        .ok_or_else(|| BotError::NotFound("no result path in callback".to_string()))?;
    let path = strip_bucket_scheme(path);
    let raw = state.store.get_text(path).await?;
    Ok(derive_move_stats(&parse_analysis_output(&raw)))
}

/// "gs://bucket/a/b.json" -> "a/b.json"; plain paths pass through.
fn strip_bucket_scheme(path: &str) -> &str {
    match path.strip_prefix("gs://") {
        Some(rest) => rest.split_once('/').map(|(_, p)| p).unwrap_or(rest),
        None => path,
    }
}

// ---------------------------------------------------------------------------
// Media + delivery
// ---------------------------------------------------------------------------

async fn deliver(
    state: &AppState,
    chat: &str,
    task_id: &str,
    stats: &[MoveStat],
    key_moves: &[MoveStat],
    comments: &[MoveComment],
) -> Result<()> {
    tracing::info!(chat, task_id, stage = ?ReviewStage::MediaSynthesizing, "rendering artifacts");

    // Overview: final position with every surviving stone numbered.
    let board = board_from_stats(stats, u32::MAX);
    let mut overview = BoardSpec::from_grid(board.grid());
    overview.numbers = stats
        .iter()
        .filter_map(|s| {
            s.played
                .as_deref()
                .and_then(coord::parse)
                .map(|pt| (pt, s.move_index))
        })
        .collect();
    let overview_url =
        upload_artifact(state, chat, task_id, "overview.png", render::board_png(&overview)?)
            .await?;

    let chart_points: Vec<(u32, f64)> = stats
        .iter()
        .filter_map(|s| s.winrate_before.map(|w| (s.move_index, w)))
        .collect();
    let chart_url = upload_artifact(
        state,
        chat,
        task_id,
        "winrate.png",
        render::winrate_chart_png(&chart_points)?,
    )
    .await?;

    // One short animation per key move; a failure degrades that move to a
    // text fallback rather than aborting the delivery.
    let mut animation_urls: Vec<Option<String>> = Vec::with_capacity(key_moves.len());
    for stat in key_moves {
        let url = match render::animation_gif(&animation_frames(stats, stat)) {
            Ok(bytes) => {
                let name = format!("move_{}.gif", stat.move_index);
                match upload_artifact(state, chat, task_id, &name, bytes).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(chat, task_id, move_index = stat.move_index, error = %e, "animation upload failed");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(chat, task_id, move_index = stat.move_index, error = %e, "animation render failed");
                None
            }
        };
        animation_urls.push(url);
    }

    tracing::info!(chat, task_id, stage = ?ReviewStage::Delivering, "sending results");

    state
        .messenger
        .send(
            chat,
            None,
            vec![
                Message::text("Full game overview:"),
                Message::image(overview_url),
                Message::text("Win-rate chart:"),
                Message::image(chart_url),
            ],
        )
        .await?;

    let mut bubbles = Vec::new();
    let mut fallbacks = Vec::new();
    for (stat, animation_url) in key_moves.iter().zip(&animation_urls) {
        let comment = comments
            .iter()
            .find(|c| c.move_index == stat.move_index)
            .map(|c| c.comment.as_str())
            .unwrap_or("No comment.");
        match animation_url {
            Some(url) => bubbles.push(build_bubble(stat, comment, url)),
            None => fallbacks.push(fallback_text(stat, comment)),
        }
    }

    if !bubbles.is_empty() {
        messaging::send_carousels(state.messenger.as_ref(), chat, bubbles).await?;
    }
    if key_moves.is_empty() {
        state
            .messenger
            .send(
                chat,
                None,
                vec![Message::text(
                    "No move gave up a significant number of points. Nice game!",
                )],
            )
            .await?;
    }
    for text in fallbacks {
        state
            .messenger
            .send(chat, None, vec![Message::text(text)])
            .await?;
        tokio::time::sleep(FALLBACK_TEXT_DELAY).await;
    }
    Ok(())
}

async fn upload_artifact(
    state: &AppState,
    chat: &str,
    task_id: &str,
    name: &str,
    bytes: Vec<u8>,
) -> Result<String> {
    let content_type = if name.ends_with(".gif") {
        "image/gif"
    } else {
        "image/png"
    };
    let path = keys::review_artifact(chat, task_id, name);
    state
        .store
        .put(&path, bytes, content_type, Some(keys::CACHE_NO_CACHE))
        .await?;
    Ok(state.store.public_url(&path))
}

/// Board position strictly before ply `upto`, rebuilt from the played
/// coordinates. Historical oddities are tolerated, the stats came from a
/// foreign record.
fn board_from_stats(stats: &[MoveStat], upto: u32) -> Board {
    let mut board = Board::new();
    for stat in stats.iter().filter(|s| s.move_index < upto) {
        let Some(point) = stat.played.as_deref().and_then(coord::parse) else {
            continue;
        };
        if let Err(e) = board.place_tolerant(point, stat_stone(stat)) {
            tracing::debug!(move_index = stat.move_index, error = %e, "skipping unplayable stat move");
        }
    }
    board
}

/// Frame sequence for one key move: the position with the played move and
/// the engine's recommendation highlighted, the played stone appearing,
/// then the principal variation stepping through with numeric labels.
fn animation_frames(stats: &[MoveStat], stat: &MoveStat) -> Vec<BoardSpec> {
    let base = board_from_stats(stats, stat.move_index);
    let played = stat.played.as_deref().and_then(coord::parse);
    let recommended = stat.engine_best.as_deref().and_then(coord::parse);

    let mut marks = Vec::new();
    if let Some(pt) = played {
        marks.push((pt, Mark::Played));
    }
    if let Some(pt) = recommended {
        marks.push((pt, Mark::Recommended));
    }

    let mut frames = Vec::new();

    let mut first = BoardSpec::from_grid(base.grid());
    first.marks = marks.clone();
    frames.push(first);

    if let Some(point) = played {
        let mut with_played = base.clone();
        let _ = with_played.place_tolerant(point, stat_stone(stat));
        let mut frame = BoardSpec::from_grid(with_played.grid());
        frame.marks = marks.clone();
        frame.last_move = Some(point);
        frames.push(frame);
    }

    // PV playback starts from the pre-move position; the first step is the
    // engine's recommendation itself.
    let mut pv_board = base.clone();
    let mut pv_stone = stat_stone(stat);
    let mut pv_numbers: Vec<(go_engine::Point, u32)> = Vec::new();
    for (i, pv_move) in stat.pv.iter().take(10).enumerate() {
        let Some(point) = coord::parse(pv_move) else {
            continue;
        };
        if pv_board.place_tolerant(point, pv_stone).is_err() {
            continue;
        }
        pv_numbers.push((point, i as u32 + 1));
        let mut frame = BoardSpec::from_grid(pv_board.grid());
        frame.numbers = pv_numbers.clone();
        frames.push(frame);
        pv_stone = pv_stone.opp();
    }

    frames
}

fn truncate_comment(comment: &str) -> String {
    if comment.chars().count() <= COMMENT_LIMIT {
        return comment.to_string();
    }
    let truncated: String = comment.chars().take(COMMENT_LIMIT).collect();
    format!("{truncated}...")
}

fn fallback_text(stat: &MoveStat, comment: &str) -> String {
    format!(
        "Move {} ({}) - {}\n\n{}",
        stat.move_index,
        color_word(&stat.color),
        stat.played.as_deref().unwrap_or("pass"),
        truncate_comment(comment)
    )
}

/// One carousel bubble for a key move.
fn build_bubble(stat: &MoveStat, comment: &str, animation_url: &str) -> Value {
    let mut body = vec![
        json!({
            "type": "text",
            "text": format!("Move {} ({})", stat.move_index, color_word(&stat.color)),
            "weight": "bold",
            "size": "lg",
            "color": "#1DB446",
        }),
        json!({
            "type": "text",
            "text": format!("Played: {}", stat.played.as_deref().unwrap_or("pass")),
            "size": "sm",
            "color": "#666666",
            "margin": "md",
        }),
    ];

    if let (Some(before), Some(after)) = (stat.winrate_before, stat.winrate_after) {
        let diff = before - after;
        let arrow = if diff > 0.0 {
            format!("(down {diff:.1}%)")
        } else {
            format!("(up {:.1}%)", -diff)
        };
        body.push(json!({
            "type": "text",
            "text": format!("Winrate: {before:.1}% -> {after:.1}% {arrow}"),
            "size": "sm",
            "color": if diff > 0.0 { "#FF6B6B" } else { "#4ECDC4" },
            "margin": "sm",
        }));
    }
    if let Some(loss) = stat.score_loss {
        body.push(json!({
            "type": "text",
            "text": format!("Score loss: {loss:.1} points"),
            "size": "sm",
            "color": "#FF6B6B",
            "margin": "sm",
        }));
    }
    body.push(json!({ "type": "separator", "margin": "md" }));
    body.push(json!({
        "type": "text",
        "text": truncate_comment(comment),
        "wrap": true,
        "size": "sm",
        "margin": "md",
        "color": "#333333",
    }));

    json!({
        "type": "bubble",
        "hero": {
            "type": "image",
            "url": animation_url,
            "size": "full",
            "aspectRatio": "1:1",
            "aspectMode": "cover",
            "action": { "type": "uri", "uri": animation_url, "label": "Watch animation" },
        },
        "body": { "type": "box", "layout": "vertical", "contents": body },
        "footer": {
            "type": "box",
            "layout": "vertical",
            "spacing": "sm",
            "contents": [{
                "type": "button",
                "style": "primary",
                "height": "sm",
                "color": "#1DB446",
                "action": { "type": "uri", "label": "Watch the animation", "uri": animation_url },
            }],
        },
    })
}
