//! Hosted assistant run API.
//!
//! The relay only needs thread/message/run primitives, so the provider
//! surface is the `RunApi` trait. OpenAI's Assistants API is the one
//! implementation.

mod openai;
mod provider;

pub use openai::OpenAiAssistants;
pub use provider::{MessageOrder, MessageRole, Run, RunApi, RunStatus, ThreadMessage};
