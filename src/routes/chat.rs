//! Chat streaming route configuration.

use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::chat::chat_handler;
use crate::state::AppState;

/// Create the chat streaming router
///
/// # Endpoint
///
/// `POST /chat` - body `{message, currentRecipe?, conversationHistory}`;
/// responds with a chunked `data: <json>\n\n` event stream.
pub fn create_chat_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
}
