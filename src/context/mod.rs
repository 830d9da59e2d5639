//! Per-thread context persistence.
//!
//! Each workspace thread carries a small key-value blob. The relay uses it
//! to remember which remote assistant thread backs the conversation, and the
//! workspace reports which channel the user was looking at when the thread
//! was opened.

mod slack;
mod store;
mod thread;

pub use slack::{CONTEXT_EVENT_TYPE, SlackMetadataContextStore};
pub use store::{ContextStore, InMemoryContextStore};
pub use thread::{ChannelContext, ThreadContext, ThreadKey};
