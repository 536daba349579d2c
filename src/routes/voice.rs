//! Voice WebSocket route configuration
//!
//! This module configures the WebSocket endpoint for the real-time voice
//! channel between the client and the cooking assistant.

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::voice::voice_handler;
use crate::state::AppState;

/// Create the voice WebSocket router
///
/// # Endpoint
///
/// `GET /voice` - WebSocket upgrade for the bidirectional voice channel
///
/// # Protocol
///
/// After the upgrade, the client sends:
/// 1. A `session_setup` control frame with the on-screen recipe and any
///    grounding instructions
/// 2. Binary frames of raw PCM16 mono audio at 24kHz
///
/// The server responds with:
/// - `connected` exactly once, whether or not the live upstream came up
/// - `transcript` / `response_transcript` for conversation text
/// - `recipe_update` when the assistant mutates the recipe
/// - Binary frames of response audio
/// - `error` on session-fatal failures
pub fn create_voice_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voice", get(voice_handler))
        .layer(TraceLayer::new_for_http())
}
