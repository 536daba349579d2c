//! Client-side transports for the two conversation channels.
//!
//! These are the pieces an application embeds: the voice transport with its
//! capture-thread bridge, and the chat stream client with its incremental
//! frame parser. Both write recipe updates into a shared [`RecipeStore`]
//! under the same version rule the server uses.
//!
//! [`RecipeStore`]: crate::core::recipe::RecipeStore

mod chat;
mod voice;

pub use chat::{
    ChatClient, ChatClientError, ChatReply, FrameParser, RECIPE_CONFIRMATION_SUFFIX,
    STREAM_FAILURE_MESSAGE,
};
pub use voice::{CaptureBridge, VoiceClient, VoiceClientError, VoiceClientEvent};
