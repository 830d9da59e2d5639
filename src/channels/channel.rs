//! Channel trait and assistant event types.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{ChannelContext, ThreadKey};
use crate::error::ChannelError;

/// An assistant thread was opened or its channel context changed.
#[derive(Debug, Clone)]
pub struct ThreadEvent {
    /// Unique event ID, for log correlation.
    pub id: Uuid,
    /// Workspace thread the event belongs to.
    pub thread: ThreadKey,
    /// User who owns the assistant thread.
    pub user_id: Option<String>,
    /// Channel the user was viewing, if any.
    pub context: ChannelContext,
}

impl ThreadEvent {
    pub fn new(thread: ThreadKey, user_id: Option<String>, context: ChannelContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread,
            user_id,
            context,
        }
    }
}

/// A message a user typed into an assistant thread.
#[derive(Debug, Clone)]
pub struct UserMessage {
    /// Unique event ID, for log correlation.
    pub id: Uuid,
    /// Workspace thread the message was posted in.
    pub thread: ThreadKey,
    /// Author.
    pub user_id: Option<String>,
    /// Raw message text.
    pub text: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl UserMessage {
    pub fn new(thread: ThreadKey, user_id: Option<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread,
            user_id,
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Events delivered by a workspace channel.
#[derive(Debug, Clone)]
pub enum AssistantEvent {
    ThreadStarted(ThreadEvent),
    ThreadContextChanged(ThreadEvent),
    UserMessage(UserMessage),
}

impl AssistantEvent {
    /// Thread the event targets.
    pub fn thread(&self) -> &ThreadKey {
        match self {
            AssistantEvent::ThreadStarted(e) | AssistantEvent::ThreadContextChanged(e) => {
                &e.thread
            }
            AssistantEvent::UserMessage(m) => &m.thread,
        }
    }

    /// Short event kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantEvent::ThreadStarted(_) => "thread_started",
            AssistantEvent::ThreadContextChanged(_) => "thread_context_changed",
            AssistantEvent::UserMessage(_) => "user_message",
        }
    }
}

/// Stream of incoming events.
pub type EventStream = Pin<Box<dyn Stream<Item = AssistantEvent> + Send>>;

/// A clickable prompt offered when a thread opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedPrompt {
    pub title: String,
    pub message: String,
}

impl SuggestedPrompt {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Transient status shown under the thread while the relay works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Relay is waiting on the assistant.
    Thinking(String),
    /// Remove the indicator.
    Clear,
}

/// Trait for workspace channels.
///
/// A channel delivers assistant events and exposes the thread operations
/// the relay needs to answer them.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name (e.g., "slack").
    fn name(&self) -> &str;

    /// Start listening for events.
    ///
    /// The channel should handle reconnection internally; the stream ends
    /// only when the channel is shut down.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Post a text reply into the thread.
    async fn say(&self, thread: &ThreadKey, text: &str) -> Result<(), ChannelError>;

    /// Set the thread's display title.
    async fn set_title(&self, thread: &ThreadKey, title: &str) -> Result<(), ChannelError>;

    /// Show or clear a status indicator.
    ///
    /// Default implementation does nothing (for channels without status).
    async fn send_status(
        &self,
        _thread: &ThreadKey,
        _status: StatusUpdate,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Offer suggested prompts in the thread.
    async fn set_suggested_prompts(
        &self,
        thread: &ThreadKey,
        prompts: &[SuggestedPrompt],
    ) -> Result<(), ChannelError>;

    /// Check if the channel is healthy.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Gracefully shut down the channel.
    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
