pub mod ai;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::llm_client::proxy::{COMPLETION_PATH, STREAM_PATH};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Completion proxy (served to clients that must not hold the API key)
        .route(COMPLETION_PATH, post(ai::handle_completion))
        .route(STREAM_PATH, post(ai::handle_stream))
        .with_state(state)
}
