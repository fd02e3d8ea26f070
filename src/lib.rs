//! Request dispatcher between a chat/moderation bot and its LLM backend - Library exports for
//! testing

pub mod api;
pub mod core;
pub mod infrastructure;
