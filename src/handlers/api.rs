//! Plain REST handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// Health check endpoint
///
/// Reports service identity and how many voice sessions are live.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "active_voice_sessions": state.sessions.active_count(),
        "tracked_recipes": state.recipes.len(),
    }))
}
