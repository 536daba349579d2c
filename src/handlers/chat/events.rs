//! Chat stream wire format.
//!
//! The typed chat channel answers with a chunked body of newline-delimited
//! frames, each `data: <json>\n\n`. Frames are order-significant: zero or
//! more `content` fragments, at most one `recipeUpdate`, then exactly one
//! terminal `done` or `error` frame and nothing after it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::core::completion::ChatTurn;
use crate::core::recipe::RecipeSnapshot;

/// Frame prefix on the chat stream.
pub const FRAME_PREFIX: &str = "data: ";

/// Frame terminator on the chat stream.
pub const FRAME_TERMINATOR: &str = "\n\n";

/// Request body for `POST /chat`.
///
/// `conversation_history` is the turns the client already displays, oldest
/// to newest, including the just-submitted user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, rename = "currentRecipe", skip_serializing_if = "Option::is_none")]
    pub current_recipe: Option<RecipeSnapshot>,
    #[serde(default, rename = "conversationHistory")]
    pub conversation_history: Vec<ChatTurn>,
}

/// One frame of the chat stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    /// Incremental reply text; concatenation in order reconstructs the reply
    Content { content: String },
    /// Complete replacement recipe
    RecipeUpdate { recipe: RecipeSnapshot },
    /// Terminal success marker
    Done,
    /// Terminal failure marker, mutually exclusive with `done`
    Error { message: String },
}

impl StreamEvent {
    /// Encode the event as one wire frame.
    pub fn encode(&self) -> Bytes {
        match serde_json::to_string(self) {
            Ok(json) => Bytes::from(format!("{FRAME_PREFIX}{json}{FRAME_TERMINATOR}")),
            Err(e) => {
                error!("Failed to encode stream event: {e}");
                Bytes::from_static(b"data: {\"type\":\"error\",\"message\":\"encoding failure\"}\n\n")
            }
        }
    }

    /// Whether this frame ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags_are_camel_case() {
        assert_eq!(
            serde_json::to_string(&StreamEvent::Done).expect("serialize"),
            r#"{"type":"done"}"#
        );
        let json = serde_json::to_string(&StreamEvent::Content {
            content: "hi".to_string(),
        })
        .expect("serialize");
        assert_eq!(json, r#"{"type":"content","content":"hi"}"#);

        let json = serde_json::to_string(&StreamEvent::RecipeUpdate {
            recipe: RecipeSnapshot {
                id: "r1".to_string(),
                title: "Toast".to_string(),
                servings: None,
                ingredients: Vec::new(),
                steps: Vec::new(),
                last_updated: 1,
            },
        })
        .expect("serialize");
        assert!(json.starts_with(r#"{"type":"recipeUpdate""#));
    }

    #[test]
    fn test_encode_produces_framed_payload() {
        let frame = StreamEvent::Done.encode();
        assert_eq!(&frame[..], b"data: {\"type\":\"done\"}\n\n");
    }

    #[test]
    fn test_terminal_classification() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(
            StreamEvent::Error {
                message: "x".to_string()
            }
            .is_terminal()
        );
        assert!(
            !StreamEvent::Content {
                content: "x".to_string()
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_chat_request_wire_names() {
        let request: ChatRequest = serde_json::from_str(
            r#"{
                "message": "Make it spicier",
                "conversationHistory": [
                    {"role": "user", "content": "Make it spicier"}
                ]
            }"#,
        )
        .expect("deserialize");
        assert_eq!(request.message, "Make it spicier");
        assert!(request.current_recipe.is_none());
        assert_eq!(request.conversation_history.len(), 1);
    }
}
