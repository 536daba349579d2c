//! Plain REST routes.

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::handlers::api::health_check;
use crate::state::AppState;

/// Create the REST router
///
/// # Endpoints
///
/// `GET /` - health check with live session counts
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(health_check))
}
