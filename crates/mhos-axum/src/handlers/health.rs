//! Health handlers.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// Plain liveness check mounted at the root.
pub async fn check() -> &'static str {
    "OK"
}

/// Liveness plus a few counters for dashboards.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "agents": state.registry.len(),
        "streams": state.streams.session_count(),
    }))
}
