pub mod chat;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat::chat))
        .with_state(state)
}

/// GET /health: liveness probe.
async fn health() -> &'static str {
    "OK"
}
