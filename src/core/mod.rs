//! Core domain modules: audio framing, upstream AI bindings, and the shared
//! recipe document model.

pub mod audio;
pub mod completion;
pub mod live;
pub mod recipe;
