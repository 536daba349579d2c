//! Upstream conversation bindings for voice sessions.
//!
//! Every voice session owns exactly one binding to an upstream AI service.
//! The preferred binding is [`LiveBinding`], a WebSocket attachment to the
//! bidirectional Live Session Service. When that cannot be established the
//! session binds to [`FallbackBinding`] instead, which synthesizes utterances
//! through the single-shot Completion Service. Both implement [`Binding`],
//! so the session bridge never needs to know which one it holds beyond the
//! degraded flag.

mod base;
mod fallback;
mod upstream;

pub use base::{Binding, BindingError, BindingEvent, BindingMode, BindingResult, BoxedBinding};
pub use fallback::FallbackBinding;
pub use upstream::{LiveBinding, LiveConfig};
