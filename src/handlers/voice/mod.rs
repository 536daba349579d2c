//! Voice WebSocket channel: session bridge, control wire, session registry.

mod handler;
mod messages;
mod session;

pub use handler::voice_handler;
pub use messages::{
    ControlValidationError, IncomingControl, MAX_INSTRUCTIONS_SIZE, MessageRoute, OutgoingControl,
};
pub use session::{BridgeState, ConversationSession, SessionHandle, SessionRegistry};
