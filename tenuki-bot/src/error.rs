use go_engine::GoError;
use thiserror::Error;

/// Error kinds crossing module boundaries inside the bot. The handler layer
/// turns these into short user-visible texts; the webhook route itself
/// always answers 200.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("store error: {0}")]
    Store(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("messaging error: {0}")]
    Transport(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("commentary error: {0}")]
    Llm(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Short hint shown to the user for a rejected move.
pub fn move_hint(err: &GoError) -> &'static str {
    match err {
        GoError::NotOnBoard => "That point is not on the board (try e.g. D4, Q16).",
        GoError::Occupied => "There is already a stone there.",
        GoError::Suicide => "Suicide is not allowed.",
        GoError::KoViolation => "Ko: you cannot recapture immediately, play elsewhere first.",
    }
}

pub type Result<T, E = BotError> = std::result::Result<T, E>;
