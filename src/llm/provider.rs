//! Run API abstraction.
//!
//! A hosted assistant keeps its own conversation threads. The relay appends
//! user text to a thread, starts a run, and polls the run until it settles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Role of a message inside a remote thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Lifecycle state of a run. Transitions are owned by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generation job on a remote thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    /// Error reported by the remote API for failed runs.
    pub last_error: Option<String>,
}

/// A message inside a remote thread, with its text parts joined.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    pub text: String,
}

impl ThreadMessage {
    pub fn new(id: impl Into<String>, role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            text: text.into(),
        }
    }
}

/// Listing order for thread messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrder {
    /// Oldest first.
    Asc,
    /// Newest first.
    Desc,
}

impl MessageOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageOrder::Asc => "asc",
            MessageOrder::Desc => "desc",
        }
    }
}

/// Remote assistant run API.
#[async_trait]
pub trait RunApi: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Create an empty remote thread and return its ID.
    async fn create_thread(&self) -> Result<String, LlmError>;

    /// Append a message to a thread.
    async fn append_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<(), LlmError>;

    /// Start a run of `assistant_id` on a thread.
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, LlmError>;

    /// Fetch the current state of a run.
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, LlmError>;

    /// Ask the provider to stop a run. The thread accepts new messages once
    /// the run has left its active states.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, LlmError>;

    /// List messages of a thread, optionally only those produced by one run.
    async fn list_messages(
        &self,
        thread_id: &str,
        order: MessageOrder,
        run_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>, LlmError>;
}
