//! Base trait and types shared by the live and fallback bindings.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

use crate::core::completion::CompletionError;
use crate::core::recipe::RecipeSnapshot;

/// Errors raised by a binding operation.
#[derive(Debug, Error)]
pub enum BindingError {
    /// Upstream attachment could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Upstream WebSocket failed after attachment
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Wire payload could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation attempted on a closed binding
    #[error("not connected")]
    NotConnected,

    /// The fallback's completion call failed
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

pub type BindingResult<T> = Result<T, BindingError>;

/// Which upstream a session ended up bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMode {
    /// Live Session Service attachment succeeded
    Live,
    /// Running on the per-utterance Completion Service fallback
    Degraded,
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingMode::Live => write!(f, "live"),
            BindingMode::Degraded => write!(f, "degraded"),
        }
    }
}

/// Events a binding surfaces to the session bridge.
///
/// Delivered over an mpsc channel in upstream emission order; the bridge
/// relays them onto the client WebSocket.
#[derive(Debug)]
pub enum BindingEvent {
    /// Transcription of the user's speech
    UserTranscript { text: String },
    /// Assistant reply text; non-final entries carry the accumulated prefix
    AssistantTranscript { text: String, is_final: bool },
    /// Response audio, PCM16 mono little-endian
    Audio(Bytes),
    /// A structured tool call, arguments still unvalidated JSON
    ToolCall { name: String, arguments: String },
    /// Upstream failure; the session moves to closing on receipt
    Error(String),
    /// Upstream attachment ended
    Closed,
}

/// A session's attachment to its upstream AI service.
#[async_trait]
pub trait Binding: Send {
    /// Whether this is the live or the degraded attachment.
    fn mode(&self) -> BindingMode;

    /// Forward one block of caller audio (PCM16 mono little-endian).
    async fn send_audio(&mut self, audio: Bytes) -> BindingResult<()>;

    /// Apply the client's `session_setup`: grounding instructions and the
    /// recipe currently on screen.
    async fn apply_setup(
        &mut self,
        instructions: Option<String>,
        recipe: Option<RecipeSnapshot>,
    ) -> BindingResult<()>;

    /// Release the upstream attachment. Idempotent.
    async fn close(&mut self) -> BindingResult<()>;
}

/// Boxed binding as held by a session.
pub type BoxedBinding = Box<dyn Binding>;
