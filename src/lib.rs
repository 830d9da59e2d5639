//! Relays Slack assistant threads to an OpenAI assistant.
//!
//! Each Slack assistant thread is mirrored by one remote assistant thread.
//! User messages are appended to it, a run is started and polled to
//! completion, and the assistant's reply is posted back into Slack.

pub mod agent;
pub mod channels;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod relay;
pub mod testing;
