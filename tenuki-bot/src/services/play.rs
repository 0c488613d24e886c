//! Live play on the 19x19 board: moves, undo, save/load, reset, engine
//! opponent, positional evaluation.
//!
//! The record is the authoritative state. Every handler that mutates the
//! board (1) appends to the record, (2) persists the record, (3) persists
//! the session, in that order, and every entry point re-replays the record
//! from the store rather than trusting anything cached.

use chrono::Utc;
use go_engine::{coord, Record, Replayed, Stone};

use crate::error::{BotError, Result};
use crate::keys;
use crate::services::auth;
use crate::services::katago::{GenmoveCallback, GenmoveRequest};
use crate::services::messaging::Message;
use crate::services::render::{self, BoardSpec};
use crate::services::session::{Session, SessionPatch};
use crate::state::AppState;

fn new_game_id() -> String {
    format!("game_{}", Utc::now().timestamp())
}

async fn persist_record(state: &AppState, chat: &str, game_id: &str, record: &Record) -> Result<()> {
    state
        .store
        .put(
            &keys::game_record(chat, game_id),
            record.encode().into_bytes(),
            "application/x-go-sgf",
            Some(keys::CACHE_NO_CACHE),
        )
        .await
}

async fn load_record(state: &AppState, chat: &str, game_id: &str) -> Result<Record> {
    let text = state
        .store
        .get_text(&keys::game_record(chat, game_id))
        .await?;
    Record::decode(&text).map_err(|e| BotError::Store(format!("bad record {game_id}: {e}")))
}

/// The chat's current game, created lazily on first use.
async fn current_game(state: &AppState, chat: &str) -> Result<(Session, String, Record)> {
    let session = state.sessions.load(chat).await?;
    if let Some(game_id) = session.game_id.clone() {
        match load_record(state, chat, &game_id).await {
            Ok(record) => return Ok((session, game_id, record)),
            Err(BotError::NotFound(_)) => {
                tracing::warn!(chat, %game_id, "session points at a missing record");
            }
            Err(e) => return Err(e),
        }
    }

    let game_id = new_game_id();
    let record = Record::new();
    persist_record(state, chat, &game_id, &record).await?;
    let session = state
        .sessions
        .update(
            chat,
            SessionPatch {
                game_id: Some(game_id.clone()),
                current_turn: Some(1),
                ..Default::default()
            },
        )
        .await?;
    tracing::info!(chat, %game_id, "created new game");
    Ok((session, game_id, record))
}

fn log_replay_warnings(chat: &str, replayed: &Replayed) {
    for warning in &replayed.warnings {
        tracing::warn!(chat, ?warning, "record replay tolerance");
    }
}

/// Render a board and upload it under the game's folder; returns the
/// public URL handed to the messaging platform.
async fn upload_board(
    state: &AppState,
    chat: &str,
    game_id: &str,
    prefix: &str,
    spec: &BoardSpec,
) -> Result<String> {
    let bytes = render::board_png(spec)?;
    let name = format!("{prefix}_{}.png", Utc::now().timestamp_millis());
    let path = keys::board_image(chat, game_id, &name);
    state
        .store
        .put(&path, bytes, "image/png", Some(keys::CACHE_NO_CACHE))
        .await?;
    Ok(state.store.public_url(&path))
}

fn turn_prompt(stone: Stone) -> String {
    format!("your turn ({stone})")
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

/// Coordinate input: place the user's stone, persist, render, and either
/// reply with the board or hand off to the engine opponent. In engine
/// mode the reply token is NOT consumed here; it travels with the genmove
/// dispatch so the user's first reply is one combined message.
pub async fn handle_move(
    state: &AppState,
    chat: &str,
    reply_token: Option<&str>,
    coord_text: &str,
) -> Result<()> {
    let (session, game_id, mut record) = current_game(state, chat).await?;
    let replayed = record.replay();
    log_replay_warnings(chat, &replayed);

    let Some(point) = coord::parse(coord_text) else {
        state
            .messenger
            .send(
                chat,
                reply_token,
                vec![Message::text(
                    "That doesn't look like a board coordinate (try e.g. D4, Q16).",
                )],
            )
            .await?;
        return Ok(());
    };

    let stone = replayed.current_turn;
    let mut board = replayed.board;
    if let Err(rules_error) = board.place(point, stone) {
        let hint = crate::error::move_hint(&rules_error);
        state
            .messenger
            .send(chat, reply_token, vec![Message::text(format!("Hint: {hint}"))])
            .await?;
        return Ok(());
    }

    record.append_move(stone, point);
    persist_record(state, chat, &game_id, &record).await?;
    state
        .sessions
        .update(
            chat,
            SessionPatch {
                game_id: Some(game_id.clone()),
                current_turn: Some(stone.opp().turn_index()),
                ..Default::default()
            },
        )
        .await?;

    let mut spec = BoardSpec::from_grid(board.grid());
    spec.last_move = Some(point);
    let image_url = upload_board(state, chat, &game_id, "board", &spec).await?;

    if !session.engine_opponent_mode {
        state
            .messenger
            .send(chat, reply_token, vec![Message::image(image_url)])
            .await?;
        return Ok(());
    }

    // Engine opponent: dispatch and keep the reply token alive across the
    // async hop so the callback can send one bundled response.
    let request = GenmoveRequest {
        target_chat: chat.to_string(),
        record_path: keys::game_record(chat, &game_id),
        current_turn: stone.opp().turn_index(),
        reply_token: reply_token.map(str::to_string),
        user_board_image_url: Some(image_url.clone()),
        callback_url: state.callback_url("/callback/get_ai_next_move"),
    };
    if let Err(e) = state.engine.dispatch_genmove(request).await {
        tracing::error!(chat, error = %e, "genmove dispatch failed");
        state
            .messenger
            .send(
                chat,
                reply_token,
                vec![
                    Message::image(image_url),
                    Message::text(format!("The engine is unavailable: {e}")),
                ],
            )
            .await?;
    }
    Ok(())
}

/// Completion of the engine's move. State is re-read from the store; the
/// reply token and the user's board image arrive inside the callback.
pub async fn complete_engine_move(state: &AppState, cb: GenmoveCallback) -> Result<()> {
    let chat = cb.target_id.as_str();
    let reply_token = cb.reply_token.as_deref();

    let mut bundle: Vec<Message> = Vec::new();
    if let Some(url) = &cb.user_board_image_url {
        bundle.push(Message::image(url.clone()));
    }

    let mv = match (cb.status.as_str(), cb.r#move.as_deref()) {
        ("success", Some(mv)) => mv.to_string(),
        _ => {
            let error = cb.error.unwrap_or_else(|| "unknown engine error".to_string());
            tracing::error!(chat, %error, "engine move failed");
            bundle.push(Message::text(format!("The engine failed to move: {error}")));
            state.messenger.send(chat, reply_token, bundle).await?;
            return Ok(());
        }
    };

    let session = state.sessions.load(chat).await?;
    let Some(game_id) = session.game_id.clone() else {
        bundle.push(Message::text(
            "The game this move belonged to no longer exists.",
        ));
        state.messenger.send(chat, reply_token, bundle).await?;
        return Ok(());
    };
    let mut record = load_record(state, chat, &game_id).await?;
    let replayed = record.replay();
    log_replay_warnings(chat, &replayed);

    let stone = Stone::from_turn_index(cb.current_turn).unwrap_or(replayed.current_turn);
    let point = coord::parse(&mv);
    let placed = match point {
        Some(point) => {
            let mut board = replayed.board;
            board.place(point, stone).map(|_| (board, point))
        }
        None => Err(go_engine::GoError::NotOnBoard),
    };

    let (board, point) = match placed {
        Ok(ok) => ok,
        Err(e) => {
            tracing::error!(chat, %mv, error = %e, "engine move was not playable");
            bundle.push(Message::text(format!(
                "The engine suggested {mv}, but it cannot be played: {e}."
            )));
            state.messenger.send(chat, reply_token, bundle).await?;
            return Ok(());
        }
    };

    record.append_move(stone, point);
    persist_record(state, chat, &game_id, &record).await?;
    state
        .sessions
        .update(
            chat,
            SessionPatch {
                game_id: Some(game_id.clone()),
                current_turn: Some(stone.opp().turn_index()),
                ..Default::default()
            },
        )
        .await?;

    let mut spec = BoardSpec::from_grid(board.grid());
    spec.last_move = Some(point);
    let engine_image_url = upload_board(state, chat, &game_id, "board_engine", &spec).await?;

    bundle.push(Message::text(format!("engine played {mv}")));
    bundle.push(Message::image(engine_image_url));
    bundle.push(Message::text(turn_prompt(stone.opp())));
    state.messenger.send(chat, reply_token, bundle).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Undo / load / reset
// ---------------------------------------------------------------------------

pub async fn handle_undo(state: &AppState, chat: &str, reply_token: Option<&str>) -> Result<()> {
    let (_, game_id, mut record) = current_game(state, chat).await?;
    if record.pop_last_move().is_none() {
        state
            .messenger
            .send(
                chat,
                reply_token,
                vec![Message::text("The board is at the start, nothing to undo.")],
            )
            .await?;
        return Ok(());
    }

    persist_record(state, chat, &game_id, &record).await?;
    let replayed = record.replay();
    log_replay_warnings(chat, &replayed);
    state
        .sessions
        .update(
            chat,
            SessionPatch {
                current_turn: Some(replayed.current_turn.turn_index()),
                ..Default::default()
            },
        )
        .await?;

    let mut spec = BoardSpec::from_grid(replayed.board.grid());
    spec.last_move = replayed.last_move;
    let image_url = upload_board(state, chat, &game_id, "board_undo", &spec).await?;
    state
        .messenger
        .send(
            chat,
            reply_token,
            vec![
                Message::text(format!(
                    "Undid the last move. Now to play: {}.",
                    replayed.current_turn
                )),
                Message::image(image_url),
            ],
        )
        .await?;
    Ok(())
}

async fn send_loaded_board(
    state: &AppState,
    chat: &str,
    reply_token: Option<&str>,
    game_id: &str,
    record: &Record,
    intro: String,
) -> Result<()> {
    let replayed = record.replay();
    log_replay_warnings(chat, &replayed);
    let mut spec = BoardSpec::from_grid(replayed.board.grid());
    spec.last_move = replayed.last_move;
    spec.numbers = replayed.move_numbers.clone();
    let image_url = upload_board(state, chat, game_id, "board_restored", &spec).await?;
    state
        .messenger
        .send(
            chat,
            reply_token,
            vec![
                Message::text(format!(
                    "{intro}\nTotal moves: {}\nNow to play: {}.",
                    record.move_count(),
                    replayed.current_turn
                )),
                Message::image(image_url),
            ],
        )
        .await?;
    Ok(())
}

/// `load` — re-render the current record.
pub async fn handle_load(state: &AppState, chat: &str, reply_token: Option<&str>) -> Result<()> {
    let session = state.sessions.load(chat).await?;
    let Some(game_id) = session.game_id else {
        state
            .messenger
            .send(
                chat,
                reply_token,
                vec![Message::text("No saved game found.")],
            )
            .await?;
        return Ok(());
    };
    let record = load_record(state, chat, &game_id).await?;
    send_loaded_board(
        state,
        chat,
        reply_token,
        &game_id,
        &record,
        format!("Loaded game (game_id: {game_id})."),
    )
    .await
}

/// `load <game_id>` — switch the session to that record. The engine
/// opponent flag is untouched (merge-preserve).
pub async fn handle_load_game(
    state: &AppState,
    chat: &str,
    reply_token: Option<&str>,
    game_id: &str,
) -> Result<()> {
    let record = match load_record(state, chat, game_id).await {
        Ok(record) => record,
        Err(BotError::NotFound(_)) => {
            state
                .messenger
                .send(
                    chat,
                    reply_token,
                    vec![Message::text(format!("No record found for {game_id}."))],
                )
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let replayed = record.replay();
    state
        .sessions
        .update(
            chat,
            SessionPatch {
                game_id: Some(game_id.to_string()),
                current_turn: Some(replayed.current_turn.turn_index()),
                ..Default::default()
            },
        )
        .await?;

    send_loaded_board(
        state,
        chat,
        reply_token,
        game_id,
        &record,
        format!("Loaded game (game_id: {game_id})."),
    )
    .await
}

/// `load <game_id> <N>` — first N moves under a fresh game id so the
/// source game's history is not lost.
pub async fn handle_load_game_moves(
    state: &AppState,
    chat: &str,
    reply_token: Option<&str>,
    source_game_id: &str,
    count: usize,
) -> Result<()> {
    let source = match load_record(state, chat, source_game_id).await {
        Ok(record) => record,
        Err(BotError::NotFound(_)) => {
            state
                .messenger
                .send(
                    chat,
                    reply_token,
                    vec![Message::text(format!(
                        "No record found for {source_game_id}."
                    ))],
                )
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let total = source.move_count();
    if count > total {
        state
            .messenger
            .send(
                chat,
                reply_token,
                vec![Message::text(format!(
                    "That game only has {total} moves, cannot load up to move {count}."
                ))],
            )
            .await?;
        return Ok(());
    }

    let truncated = source.truncate(count);
    let new_game_id = new_game_id();
    persist_record(state, chat, &new_game_id, &truncated).await?;
    let replayed = truncated.replay();
    state
        .sessions
        .update(
            chat,
            SessionPatch {
                game_id: Some(new_game_id.clone()),
                current_turn: Some(replayed.current_turn.turn_index()),
                ..Default::default()
            },
        )
        .await?;

    send_loaded_board(
        state,
        chat,
        reply_token,
        &new_game_id,
        &truncated,
        format!(
            "Loaded the first {count} moves of {source_game_id}.\nNew game_id: {new_game_id}"
        ),
    )
    .await
}

/// `reset` — fresh record under a new game id; the engine opponent flag
/// survives and the old record stays on disk.
pub async fn handle_reset(state: &AppState, chat: &str, reply_token: Option<&str>) -> Result<()> {
    let session = state.sessions.load(chat).await?;
    let old_game_id = session.game_id.clone();

    let game_id = new_game_id();
    let record = Record::new();
    persist_record(state, chat, &game_id, &record).await?;
    state
        .sessions
        .update(
            chat,
            SessionPatch {
                game_id: Some(game_id.clone()),
                current_turn: Some(1),
                ..Default::default()
            },
        )
        .await?;

    let mut messages = vec![Message::text("Board reset, black to play.")];
    // Pointing at the previous record is best effort only.
    if let Some(old_id) = old_game_id.filter(|id| *id != game_id) {
        let old_path = keys::game_record(chat, &old_id);
        match state.store.exists(&old_path).await {
            Ok(true) => messages.push(Message::text(format!(
                "The previous game is saved as {old_id}; bring it back with \"load {old_id}\"."
            ))),
            Ok(false) => {}
            Err(e) => tracing::warn!(chat, error = %e, "could not check previous record"),
        }
    }
    state.messenger.send(chat, reply_token, messages).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

pub async fn handle_evaluation(
    state: &AppState,
    chat: &str,
    reply_token: Option<&str>,
) -> Result<()> {
    let (_, game_id, record) = current_game(state, chat).await?;
    let replayed = record.replay();
    if replayed.board.is_empty() {
        state
            .messenger
            .send(
                chat,
                reply_token,
                vec![Message::text(
                    "There is no game in progress, nothing to evaluate.",
                )],
            )
            .await?;
        return Ok(());
    }

    let evaluation = match state.engine.evaluate(&record).await {
        Ok(evaluation) => evaluation,
        Err(e) => {
            state
                .messenger
                .send(
                    chat,
                    reply_token,
                    vec![Message::text(format!("Evaluation failed: {e}"))],
                )
                .await?;
            return Ok(());
        }
    };

    let verdict = match evaluation.score_lead {
        None => "The position is too unsettled to judge reliably.".to_string(),
        Some(lead) if lead.abs() < 0.05 => {
            "The position is roughly even (about 0 points).".to_string()
        }
        Some(lead) => {
            let leader = if lead > 0.0 { "Black" } else { "White" };
            let points = (lead.abs() * 2.0).round() / 2.0;
            format!("{leader} is ahead by about {points:.1} points.")
        }
    };

    let mut spec = BoardSpec::from_grid(replayed.board.grid());
    spec.last_move = replayed.last_move;
    spec.ownership = evaluation.ownership;
    let image_url = upload_board(state, chat, &game_id, "evaluation", &spec).await?;

    state
        .messenger
        .send(
            chat,
            reply_token,
            vec![
                Message::text(verdict),
                Message::text("The territory overlay is approximate."),
                Message::image(image_url),
            ],
        )
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Engine-opponent mode and auth
// ---------------------------------------------------------------------------

pub async fn handle_vs_status(
    state: &AppState,
    chat: &str,
    reply_token: Option<&str>,
) -> Result<()> {
    let session = state.sessions.load(chat).await?;
    let user = Stone::from_turn_index(session.current_turn).unwrap_or(Stone::Black);
    let text = if session.engine_opponent_mode {
        format!(
            "Current mode: engine opponent.\n\nYou play {user}, the engine answers as {}.\n\
             Send \"vs free\" to go back to free play.",
            user.opp()
        )
    } else {
        "Current mode: free play, players alternate moves.\n\n\
         Send \"vs ai\" to play against the engine."
            .to_string()
    };
    state
        .messenger
        .send(chat, reply_token, vec![Message::text(text)])
        .await?;
    Ok(())
}

pub async fn handle_vs_ai(state: &AppState, chat: &str, reply_token: Option<&str>) -> Result<()> {
    if !auth::is_authorized(state, chat).await? {
        state
            .messenger
            .send(chat, reply_token, vec![Message::text(auth::AUTH_PROMPT)])
            .await?;
        return Ok(());
    }
    let session = state
        .sessions
        .update(
            chat,
            SessionPatch {
                engine_opponent_mode: Some(true),
                ..Default::default()
            },
        )
        .await?;
    let user = Stone::from_turn_index(session.current_turn).unwrap_or(Stone::Black);
    state
        .messenger
        .send(
            chat,
            reply_token,
            vec![Message::text(format!(
                "Engine opponent mode is on! You play {user}, the engine plays {}.\n\
                 Make a move (e.g. D4).",
                user.opp()
            ))],
        )
        .await?;
    Ok(())
}

pub async fn handle_vs_free(state: &AppState, chat: &str, reply_token: Option<&str>) -> Result<()> {
    state
        .sessions
        .update(
            chat,
            SessionPatch {
                engine_opponent_mode: Some(false),
                ..Default::default()
            },
        )
        .await?;
    state
        .messenger
        .send(
            chat,
            reply_token,
            vec![Message::text(
                "Engine opponent mode is off, back to free play (players alternate moves).",
            )],
        )
        .await?;
    Ok(())
}

pub async fn handle_auth(
    state: &AppState,
    chat: &str,
    reply_token: Option<&str>,
    token: &str,
) -> Result<()> {
    auth::store_token(state, chat, token).await?;
    state
        .messenger
        .send(
            chat,
            reply_token,
            vec![Message::text("Access token saved for this chat.")],
        )
        .await?;
    Ok(())
}
