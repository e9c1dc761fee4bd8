use axum::{extract::State, routing::get, Json, Router};

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// GET /health: liveness probe with the current connection count.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.connections.len(),
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Build the axum Router: the WebSocket gateway plus a health probe.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::ws_upgrade))
        .route("/health", get(health))
        .with_state(state)
}
