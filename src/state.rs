//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::completion::CompletionClient;
use crate::core::recipe::RecipeStore;
use crate::handlers::voice::SessionRegistry;

/// Process-wide state handed to every handler.
pub struct AppState {
    pub config: ServerConfig,
    /// Completion Service client shared by the chat channel and the voice
    /// fallback path
    pub completion: CompletionClient,
    /// Live recipe documents, shared by both channels
    pub recipes: RecipeStore,
    /// Active voice sessions
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let completion = CompletionClient::new(
            config.completion_api_url.clone(),
            config.completion_api_key.clone(),
            config.completion_model.clone(),
        );
        Arc::new(Self {
            config,
            completion,
            recipes: RecipeStore::new(),
            sessions: SessionRegistry::new(),
        })
    }
}
