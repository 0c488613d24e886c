//! Engine completion callbacks. Both routes re-enter their orchestrator
//! with nothing but the callback payload and the store; no in-memory task
//! map exists.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::services::katago::{GenmoveCallback, ReviewCallback};
use crate::services::{play, review};
use crate::state::AppState;

pub async fn review(State(state): State<AppState>, Json(cb): Json<ReviewCallback>) -> Json<Value> {
    let task_id = cb.task_id.clone();
    tracing::info!(%task_id, status = %cb.status, "review callback");
    if let Err(e) = review::process_review_callback(&state, cb).await {
        tracing::error!(%task_id, error = %e, "review callback processing failed");
    }
    Json(json!({ "status": "received", "task_id": task_id }))
}

pub async fn genmove(
    State(state): State<AppState>,
    Json(cb): Json<GenmoveCallback>,
) -> Json<Value> {
    tracing::info!(target = %cb.target_id, status = %cb.status, "genmove callback");
    if let Err(e) = play::complete_engine_move(&state, cb).await {
        tracing::error!(error = %e, "genmove callback processing failed");
    }
    Json(json!({ "status": "received" }))
}
