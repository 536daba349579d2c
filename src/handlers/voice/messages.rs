//! Voice WebSocket control message types.
//!
//! Control travels as JSON text frames tagged by `type`; audio travels as raw
//! binary frames of PCM16 mono little-endian samples. Both the server and the
//! in-crate voice client use these definitions, so there is a single source
//! of truth for the wire.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::recipe::RecipeSnapshot;

/// Maximum allowed size for grounding instructions (100 KB)
pub const MAX_INSTRUCTIONS_SIZE: usize = 100 * 1024;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming control frames from the client.
///
/// Unknown `type` tags fail serde decoding; the handler logs and ignores
/// them instead of crashing the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingControl {
    /// Session grounding, sent once immediately after the socket opens
    #[serde(rename = "session_setup")]
    SessionSetup {
        /// Recipe the user is currently viewing
        #[serde(default, rename = "currentRecipe")]
        current_recipe: Option<RecipeSnapshot>,
        /// Extra grounding instructions for the assistant
        #[serde(default)]
        instructions: Option<String>,
    },
}

/// Oversized control payloads are rejected instead of forwarded upstream.
#[derive(Debug, Clone, Error)]
pub enum ControlValidationError {
    #[error("instructions too large: {size} bytes (max: {max} bytes)")]
    InstructionsTooLarge { size: usize, max: usize },
}

impl IncomingControl {
    /// Validates field sizes to prevent resource exhaustion.
    pub fn validate_size(&self) -> Result<(), ControlValidationError> {
        match self {
            IncomingControl::SessionSetup { instructions, .. } => {
                if let Some(instructions) = instructions {
                    let size = instructions.len();
                    if size > MAX_INSTRUCTIONS_SIZE {
                        return Err(ControlValidationError::InstructionsTooLarge {
                            size,
                            max: MAX_INSTRUCTIONS_SIZE,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Outgoing control frames to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutgoingControl {
    /// Session is up; sent exactly once, on the live and the degraded path alike
    #[serde(rename = "connected")]
    Connected { message: String },

    /// Transcription of the caller's speech
    #[serde(rename = "transcript")]
    Transcript { text: String },

    /// Assistant reply text
    #[serde(rename = "response_transcript")]
    ResponseTranscript { text: String },

    /// Complete replacement recipe produced by a tool call
    #[serde(rename = "recipe_update")]
    RecipeUpdate { recipe: RecipeSnapshot },

    /// Session-fatal error
    #[serde(rename = "error")]
    Error { message: String },
}

// =============================================================================
// Message Routing
// =============================================================================

/// Routing envelope for the per-connection writer task.
pub enum MessageRoute {
    /// JSON control frame
    Control(OutgoingControl),
    /// Binary response audio
    Audio(Bytes),
    /// Close the connection
    Close,
}
