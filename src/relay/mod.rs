//! Conversation relay.
//!
//! Bridges workspace assistant threads to remote assistant threads. Each
//! workspace thread is backed by at most one remote thread, whose ID is kept
//! in the thread's context. A user message is appended to that remote
//! thread, a run is started and polled, and the assistant's output is posted
//! back. Every failure is answered with a fixed apology; nothing propagates
//! past the handler.

mod locks;
mod poll;
pub mod replies;

pub use locks::ThreadLocks;
pub use poll::{PollPolicy, wait_for_run};

use std::sync::Arc;

use chrono::Utc;

use crate::channels::{AssistantEvent, Channel, StatusUpdate, ThreadEvent, UserMessage};
use crate::config::RelayConfig;
use crate::context::{ChannelContext, ContextStore, ThreadContext, ThreadKey};
use crate::error::RelayError;
use crate::llm::{MessageOrder, MessageRole, RunApi, RunStatus};

/// Handles assistant events for every thread of one workspace channel.
pub struct ConversationRelay {
    channel: Arc<dyn Channel>,
    runs: Arc<dyn RunApi>,
    contexts: Arc<dyn ContextStore>,
    config: RelayConfig,
    locks: ThreadLocks,
}

impl ConversationRelay {
    pub fn new(
        channel: Arc<dyn Channel>,
        runs: Arc<dyn RunApi>,
        contexts: Arc<dyn ContextStore>,
        config: RelayConfig,
    ) -> Self {
        Self {
            channel,
            runs,
            contexts,
            config,
            locks: ThreadLocks::new(),
        }
    }

    /// Handle one event. Never fails; errors are logged and, for user
    /// messages, answered with an apology.
    pub async fn handle(&self, event: AssistantEvent) {
        match event {
            AssistantEvent::ThreadStarted(event) => self.on_thread_started(&event).await,
            AssistantEvent::ThreadContextChanged(event) => {
                self.on_thread_context_changed(&event).await
            }
            AssistantEvent::UserMessage(message) => self.on_user_message(&message).await,
        }
    }

    /// Greet the user, remember the channel context and offer prompts.
    pub async fn on_thread_started(&self, event: &ThreadEvent) {
        if let Err(e) = self.start_thread(event).await {
            tracing::error!(
                thread = %event.thread,
                event_id = %event.id,
                "Failed to handle thread start: {}",
                e
            );
        }
    }

    async fn start_thread(&self, event: &ThreadEvent) -> Result<(), RelayError> {
        self.channel.say(&event.thread, replies::GREETING).await?;
        self.save_channel_context(&event.thread, &event.context)
            .await?;

        let prompts = replies::suggested_prompts(event.context.has_channel());
        self.channel
            .set_suggested_prompts(&event.thread, &prompts)
            .await?;
        Ok(())
    }

    /// Persist the channel context the workspace now reports.
    pub async fn on_thread_context_changed(&self, event: &ThreadEvent) {
        if let Err(e) = self
            .save_channel_context(&event.thread, &event.context)
            .await
        {
            tracing::error!(
                thread = %event.thread,
                event_id = %event.id,
                "Failed to save thread context: {}",
                e
            );
        }
    }

    async fn save_channel_context(
        &self,
        thread: &ThreadKey,
        context: &ChannelContext,
    ) -> Result<(), RelayError> {
        let _guard = self.locks.lock(thread).await;

        let mut updated = ThreadContext::from_channel_context(context);
        if let Some(previous) = self.contexts.load(thread).await? {
            updated.carry_remote_thread(&previous);
        }
        self.contexts.store(thread, &updated).await?;
        Ok(())
    }

    /// Relay a user message to the assistant and post the answer.
    pub async fn on_user_message(&self, message: &UserMessage) {
        let _guard = self.locks.lock(&message.thread).await;

        let apology = match self.relay_message(message).await {
            Ok(()) => return,
            Err(RelayError::RunTimedOut {
                thread_id,
                run_id,
                waited,
            }) => {
                tracing::error!(
                    thread = %message.thread,
                    message_id = %message.id,
                    run_id = %run_id,
                    ?waited,
                    "Run did not finish in time, cancelling"
                );
                // An active run blocks further appends to the remote thread.
                if let Err(e) = self.runs.cancel_run(&thread_id, &run_id).await {
                    tracing::warn!(run_id = %run_id, "Failed to cancel timed-out run: {}", e);
                }
                replies::TIMED_OUT_REPLY
            }
            Err(e) => {
                tracing::error!(
                    thread = %message.thread,
                    message_id = %message.id,
                    "Failed to relay message: {}",
                    e
                );
                replies::ERROR_REPLY
            }
        };

        if let Err(e) = self.channel.say(&message.thread, apology).await {
            tracing::error!(thread = %message.thread, "Failed to send apology: {}", e);
            let _ = self
                .channel
                .send_status(&message.thread, StatusUpdate::Clear)
                .await;
        }
    }

    async fn relay_message(&self, message: &UserMessage) -> Result<(), RelayError> {
        self.channel
            .set_title(&message.thread, &message.text)
            .await?;
        self.channel
            .send_status(
                &message.thread,
                StatusUpdate::Thinking(replies::THINKING_STATUS.to_string()),
            )
            .await?;

        let remote_thread = self.resolve_remote_thread(&message.thread).await?;

        self.runs
            .append_message(&remote_thread, MessageRole::User, &message.text)
            .await?;
        let run = self
            .runs
            .create_run(&remote_thread, &self.config.assistant_id)
            .await?;
        tracing::info!(
            thread = %message.thread,
            provider = self.runs.name(),
            remote_thread = %remote_thread,
            run_id = %run.id,
            "Started run"
        );

        let run = wait_for_run(self.runs.as_ref(), &remote_thread, run, &self.config.poll).await?;

        let reply = match run.status {
            RunStatus::Completed => {
                let messages = self
                    .runs
                    .list_messages(&remote_thread, MessageOrder::Asc, Some(&run.id))
                    .await?;
                let text = replies::assistant_reply(&messages);
                if text.trim().is_empty() {
                    tracing::warn!(run_id = %run.id, "Run completed without assistant text");
                    replies::RUN_FAILED_REPLY.to_string()
                } else {
                    text
                }
            }
            status => {
                tracing::warn!(
                    run_id = %run.id,
                    %status,
                    last_error = run.last_error.as_deref().unwrap_or(""),
                    "Run ended without a response"
                );
                replies::RUN_FAILED_REPLY.to_string()
            }
        };

        self.channel.say(&message.thread, &reply).await?;
        tracing::info!(
            thread = %message.thread,
            run_id = %run.id,
            latency_ms = (Utc::now() - message.received_at).num_milliseconds(),
            "Replied"
        );
        Ok(())
    }

    /// Remote thread for a workspace thread, created on first use.
    ///
    /// The new ID is stored before it is used so a later message in the
    /// same thread finds it.
    async fn resolve_remote_thread(&self, thread: &ThreadKey) -> Result<String, RelayError> {
        let mut context = self.contexts.load(thread).await?.unwrap_or_default();
        if let Some(id) = context.remote_thread_id() {
            return Ok(id.to_string());
        }

        let id = self.runs.create_thread().await?;
        context.set_remote_thread_id(id.clone());
        self.contexts.store(thread, &context).await?;
        tracing::info!(thread = %thread, remote_thread = %id, "Created remote thread");
        Ok(id)
    }
}
