//! Per-move statistics derived from the engine's full-game analysis.
//!
//! The engine emits one block per ply. Winrates arrive from the current
//! player's perspective in [0,1]; everything user-facing is normalized to
//! black's perspective as a percentage and rounded to one decimal.

use serde::{Deserialize, Serialize};

/// One analysis block as the engine reports it (camelCase on the wire).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisBlock {
    #[serde(default)]
    pub turn_number: u32,
    #[serde(default)]
    pub root_info: RootInfo,
    #[serde(default)]
    pub move_infos: Vec<MoveInfo>,
    /// The move actually played from this position, when known.
    #[serde(default)]
    pub next_move: Option<String>,
    #[serde(default)]
    pub next_move_color: Option<String>,
    #[serde(default)]
    pub next_root_info: Option<RootInfo>,
    /// Engine-reported score swing of the played move; fallback when the
    /// played move is absent from `move_infos`.
    #[serde(default)]
    pub next_score_gain: Option<f64>,
    #[serde(default)]
    pub ownership: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootInfo {
    #[serde(default)]
    pub winrate: Option<f64>,
    #[serde(default)]
    pub score_lead: Option<f64>,
    #[serde(default = "default_player")]
    pub current_player: String,
}

fn default_player() -> String {
    "B".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveInfo {
    #[serde(rename = "move")]
    pub mv: String,
    #[serde(default)]
    pub winrate: Option<f64>,
    #[serde(default)]
    pub score_lead: Option<f64>,
    #[serde(default)]
    pub pv: Vec<String>,
}

/// Derived per-move statistics, the shape the rest of the pipeline (and
/// the commentator prompt) consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveStat {
    /// 1-based ply number.
    #[serde(rename = "move")]
    pub move_index: u32,
    pub color: String,
    pub played: Option<String>,
    pub engine_best: Option<String>,
    pub pv: Vec<String>,
    pub winrate_before: Option<f64>,
    pub winrate_after: Option<f64>,
    pub score_loss: Option<f64>,
}

/// Principal variations are truncated to ten plies for display.
const PV_LIMIT: usize = 10;
/// A move only counts as key when it gives up at least this many points.
const KEY_MOVE_THRESHOLD: f64 = 2.0;
const KEY_MOVE_LIMIT: usize = 20;

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Winrate in [0,1] from `player`'s perspective -> black-perspective percent.
fn black_percent(winrate: f64, player: &str) -> f64 {
    let black = if player == "B" { winrate } else { 1.0 - winrate };
    round1(black * 100.0)
}

pub fn derive_move_stat(block: &AnalysisBlock) -> MoveStat {
    let player = block.root_info.current_player.as_str();

    let winrate_before = block.root_info.winrate.map(|w| black_percent(w, player));

    // The same perspective is used for the after-value so the delta is the
    // played move's effect, not a side flip.
    let winrate_after = match &block.next_root_info {
        Some(next) => next.winrate.map(|w| black_percent(w, player)),
        None => block.next_move.as_ref().and_then(|played| {
            block
                .move_infos
                .iter()
                .find(|m| &m.mv == played)
                .and_then(|m| m.winrate)
                .map(|w| black_percent(w, player))
        }),
    };

    let best = block.move_infos.first();
    let engine_best = best.map(|m| m.mv.clone());
    let pv = best
        .map(|m| m.pv.iter().take(PV_LIMIT).cloned().collect())
        .unwrap_or_default();

    let score_loss = block.next_move.as_ref().and_then(|played| {
        let best = best?;
        match block.move_infos.iter().find(|m| &m.mv == played) {
            Some(played_info) => {
                let best_lead = best.score_lead.unwrap_or(0.0);
                let played_lead = played_info.score_lead.unwrap_or(0.0);
                // Score leads are from the current player's perspective;
                // the sign flips for white so loss stays positive.
                let loss = if player == "B" {
                    best_lead - played_lead
                } else {
                    played_lead - best_lead
                };
                Some(round1(loss.abs()))
            }
            None => block.next_score_gain.map(|g| round1(g.abs())),
        }
    });

    MoveStat {
        move_index: block.turn_number + 1,
        color: block
            .next_move_color
            .clone()
            .unwrap_or_else(|| player.to_string()),
        played: block.next_move.clone(),
        engine_best,
        pv,
        winrate_before,
        winrate_after,
        score_loss,
    }
}

pub fn derive_move_stats(blocks: &[AnalysisBlock]) -> Vec<MoveStat> {
    let mut stats: Vec<MoveStat> = blocks.iter().map(derive_move_stat).collect();
    stats.sort_by_key(|s| s.move_index);
    stats
}

/// Parse engine output that is either a JSON array or JSONL, one block per
/// line.
pub fn parse_analysis_output(text: &str) -> Vec<AnalysisBlock> {
    if let Ok(blocks) = serde_json::from_str::<Vec<AnalysisBlock>>(text) {
        return blocks;
    }
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(block) => Some(block),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unparsable analysis line");
                None
            }
        })
        .collect()
}

/// Key-move selection: moves with a known score loss of at least two
/// points, ranked by loss (unknown treated as zero), truncated to twenty,
/// then re-sorted by move index for presentation.
pub fn select_key_moves(stats: &[MoveStat]) -> Vec<MoveStat> {
    let mut candidates: Vec<&MoveStat> = stats
        .iter()
        .filter(|s| s.score_loss.is_some_and(|l| l >= KEY_MOVE_THRESHOLD))
        .collect();
    candidates.sort_by(|a, b| {
        let la = a.score_loss.unwrap_or(0.0);
        let lb = b.score_loss.unwrap_or(0.0);
        lb.partial_cmp(&la).unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(KEY_MOVE_LIMIT);
    candidates.sort_by_key(|s| s.move_index);
    candidates.into_iter().cloned().collect()
}
