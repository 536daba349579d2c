//! Request handlers for every server endpoint.

pub mod api;
pub mod chat;
pub mod voice;
