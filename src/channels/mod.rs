//! Workspace channels.

mod channel;
pub mod slack;

pub use channel::{
    AssistantEvent, Channel, EventStream, StatusUpdate, SuggestedPrompt, ThreadEvent, UserMessage,
};
pub use slack::{SlackApi, SlackChannel};
