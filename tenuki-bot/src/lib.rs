use axum::routing::{get, post};
use axum::Router;

pub mod commands;
pub mod config;
pub mod error;
pub mod keys;
pub mod routes;
pub mod services;
pub mod state;

pub use state::AppState;

/// Build the HTTP surface: the webhook, the two engine callback routes,
/// and a health probe.
pub fn build_router(state: AppState) -> Router {
    let webhook_path = state.config.webhook_path.clone();
    Router::new()
        .route(&webhook_path, post(routes::webhook::handle))
        .route("/callback/review", post(routes::callback::review))
        .route("/callback/get_ai_next_move", post(routes::callback::genmove))
        .route("/health", get(routes::health::health_check))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
