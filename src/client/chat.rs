//! Text stream client.
//!
//! Issues the chunked chat request and consumes the frame stream
//! incrementally. A single network delivery may hold zero, one, or many
//! complete frames, and a frame may be split anywhere, so undecoded bytes
//! are buffered across reads and a frame is only parsed once its terminator
//! has arrived.

use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::completion::ChatTurn;
use crate::core::recipe::{RecipeSnapshot, RecipeStore};
use crate::handlers::chat::{ChatRequest, StreamEvent};

/// Appended to the in-progress message when the assistant updates the recipe.
pub const RECIPE_CONFIRMATION_SUFFIX: &str = "\n\nI've updated the recipe card for you.";

/// Replaces the in-progress message when the stream reports a failure.
pub const STREAM_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while answering. Please try again.";

/// Errors from the chat client's own transport.
#[derive(Debug, Error)]
pub enum ChatClientError {
    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chat endpoint returned {0}")]
    Status(reqwest::StatusCode),

    /// The connection closed before a terminal `done` or `error` frame
    #[error("stream ended without a terminal event")]
    TruncatedStream,
}

/// Incremental decoder for `data: <json>\n\n` frames.
///
/// Push raw bytes in as they arrive; complete frames come out in order.
/// Partial frames are held back until the next push. Malformed frames are
/// logged and skipped without aborting the stream.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every frame completed by this delivery.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.windows(2).position(|pair| pair == b"\n\n") {
            let frame: Vec<u8> = self.buf.drain(..pos + 2).collect();
            let Ok(text) = std::str::from_utf8(&frame[..pos]) else {
                warn!("Skipping non-UTF-8 stream frame");
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let Some(payload) = text.strip_prefix("data:") else {
                warn!("Skipping stream frame without data prefix");
                continue;
            };
            match serde_json::from_str::<StreamEvent>(payload.trim_start()) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping malformed stream frame: {e}"),
            }
        }
        events
    }

    /// Bytes held back awaiting a frame terminator.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

/// The assistant's finished reply for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Full reply text as the UI should display it
    pub text: String,
    /// Whether a recipe update was applied to the shared store
    pub recipe_updated: bool,
}

/// Client for the chat streaming endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    store: Arc<RecipeStore>,
}

impl ChatClient {
    pub fn new(endpoint: impl Into<String>, store: Arc<RecipeStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            store,
        }
    }

    /// Send one message and consume the reply stream to completion.
    ///
    /// `history` is the conversation as already displayed; the submitted
    /// message is appended to it before sending, per the wire contract.
    /// Content fragments build the reply in order; a `recipeUpdate` is
    /// applied to the shared store under the version rule and confirmed in
    /// the reply text; an `error` frame replaces the reply with a fixed
    /// failure message. Frames after the terminal are discarded.
    pub async fn send_message(
        &self,
        message: &str,
        current_recipe: Option<RecipeSnapshot>,
        history: &[ChatTurn],
    ) -> Result<ChatReply, ChatClientError> {
        let mut conversation_history = history.to_vec();
        conversation_history.push(ChatTurn::user(message));

        let request = ChatRequest {
            message: message.to_string(),
            current_recipe,
            conversation_history,
        };

        let response = self.http.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatClientError::Status(status));
        }

        let mut bytes = response.bytes_stream();
        let mut parser = FrameParser::new();
        let mut text = String::new();
        let mut recipe_updated = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for event in parser.push(&chunk) {
                match event {
                    StreamEvent::Content { content } => text.push_str(&content),
                    StreamEvent::RecipeUpdate { recipe } => {
                        if self.store.apply_if_newer(recipe) {
                            recipe_updated = true;
                        } else {
                            debug!("Discarding stale recipe update from chat stream");
                        }
                        text.push_str(RECIPE_CONFIRMATION_SUFFIX);
                    }
                    StreamEvent::Done => {
                        return Ok(ChatReply {
                            text,
                            recipe_updated,
                        });
                    }
                    StreamEvent::Error { message } => {
                        warn!("Chat stream failed: {message}");
                        return Ok(ChatReply {
                            text: STREAM_FAILURE_MESSAGE.to_string(),
                            recipe_updated,
                        });
                    }
                }
            }
        }

        Err(ChatClientError::TruncatedStream)
    }
}
