//! Object key schema. Every per-chat object lives under one bucket; the
//! auth token may live in a separate bucket but uses the same layout.

/// Record file extension. The codec speaks SGF.
pub const RECORD_EXT: &str = "sgf";

pub const CACHE_NO_STORE: &str = "no-store";
pub const CACHE_NO_CACHE: &str = "no-cache, max-age=0";

pub fn session(chat: &str) -> String {
    format!("target/{chat}/state/session.json")
}

pub fn game_record(chat: &str, game_id: &str) -> String {
    format!("target/{chat}/boards/{game_id}/game.{RECORD_EXT}")
}

pub fn board_image(chat: &str, game_id: &str, name: &str) -> String {
    format!("target/{chat}/boards/{game_id}/{name}")
}

pub fn reviews_prefix(chat: &str) -> String {
    format!("target/{chat}/reviews/")
}

pub fn review_upload(chat: &str, stem: &str, unix_seconds: i64) -> String {
    format!("target/{chat}/reviews/{stem}_{unix_seconds}.{RECORD_EXT}")
}

pub fn review_stats(chat: &str, task_id: &str) -> String {
    format!("target/{chat}/reviews/{task_id}.json")
}

pub fn review_artifact(chat: &str, task_id: &str, name: &str) -> String {
    format!("target/{chat}/reviews/{task_id}_{name}")
}

pub fn auth_token(chat: &str) -> String {
    format!("auth/target/{chat}/auth.txt")
}

/// Task id for a review of an uploaded record: the digits after the last
/// '_' in the file stem, when present.
pub fn task_id_from_upload(path: &str) -> Option<String> {
    let stem = path
        .rsplit('/')
        .next()?
        .strip_suffix(&format!(".{RECORD_EXT}"))?;
    let digits = stem.rsplit('_').next()?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits.to_string())
    } else {
        None
    }
}
