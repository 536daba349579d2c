//! Typed chat channel: chunked stream responder and wire format.

mod events;
mod handler;

pub use events::{ChatRequest, FRAME_PREFIX, FRAME_TERMINATOR, StreamEvent};
pub use handler::chat_handler;
