//! Completion Service client module.
//!
//! The Completion Service is the single-shot prompt-to-text collaborator: a
//! chat-completion HTTP API invoked with a message list and returning either
//! a full reply or a token stream. It backs the typed chat channel and the
//! degraded voice path when the live service cannot be reached.

mod client;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::{CompletionClient, CompletionEvent};

use crate::core::recipe::RecipeSnapshot;

/// Maximum conversation turns carried into a completion request.
pub const HISTORY_LIMIT: usize = 10;

/// Speaker role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One conversation turn, as exchanged with clients and upstream services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sliding window over the most recent conversation turns.
///
/// Appending past [`HISTORY_LIMIT`] drops the oldest turn; relative order is
/// preserved. This is the shape handed to the Completion Service, so prompts
/// stay bounded no matter how long a session runs.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    turns: VecDeque<ChatTurn>,
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a window from an existing turn list, keeping only the newest
    /// [`HISTORY_LIMIT`] entries.
    pub fn from_turns(turns: impl IntoIterator<Item = ChatTurn>) -> Self {
        let mut window = Self::new();
        for turn in turns {
            window.push(turn);
        }
        window
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > HISTORY_LIMIT {
            self.turns.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter()
    }

    /// Oldest-to-newest copy of the window, for building a request.
    pub fn to_vec(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }
}

/// Errors from the Completion Service.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Request could not be sent or the connection dropped
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Service answered with a non-success status
    #[error("completion service returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Response arrived but carried no usable content
    #[error("completion response carried no content")]
    MissingContent,

    /// Streamed payload could not be decoded
    #[error("malformed completion stream: {0}")]
    Stream(String),
}

/// Assistant grounding prompt shared by both channels.
///
/// Kept deliberately short: the product-side prompt templates are an external
/// concern, this is only the contract the bridge needs the model to honor.
pub fn build_system_prompt(
    instructions: Option<&str>,
    recipe: Option<&RecipeSnapshot>,
) -> String {
    let mut prompt = String::from(
        "You are a friendly cooking assistant. Answer briefly and conversationally. \
         When the user asks you to change the recipe, call the set_recipe tool with \
         the complete updated recipe.",
    );
    if let Some(extra) = instructions
        && !extra.is_empty()
    {
        prompt.push_str("\n\n");
        prompt.push_str(extra);
    }
    if let Some(recipe) = recipe
        && let Ok(json) = serde_json::to_string(recipe)
    {
        prompt.push_str("\n\nThe recipe currently on screen:\n");
        prompt.push_str(&json);
    }
    prompt
}
