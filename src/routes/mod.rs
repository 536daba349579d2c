//! Router assembly, one module per endpoint group.

pub mod api;
pub mod chat;
pub mod voice;
