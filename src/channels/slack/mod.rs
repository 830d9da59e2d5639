//! Slack assistant channel.
//!
//! Events arrive over Socket Mode; replies, titles, status and suggested
//! prompts go out through the Web API with the bot token.

mod api;
mod socket_mode;
pub mod types;

pub use api::SlackApi;
pub use socket_mode::{FrameAction, SocketModeClient, handle_frame};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::channels::{Channel, EventStream, StatusUpdate, SuggestedPrompt};
use crate::config::SlackConfig;
use crate::context::ThreadKey;
use crate::error::ChannelError;

/// Buffered events between the socket reader and the dispatcher.
const EVENT_BUFFER: usize = 256;

/// Slack channel backed by Socket Mode and the Web API.
pub struct SlackChannel {
    config: SlackConfig,
    api: Arc<SlackApi>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl SlackChannel {
    pub fn new(config: SlackConfig, api: Arc<SlackApi>) -> Self {
        Self {
            config,
            api,
            receiver: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let auth = self
            .api
            .auth_test()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "slack".to_string(),
                reason: format!("Bot token rejected: {}", e),
            })?;
        tracing::info!(bot_user = %auth.user_id, "Slack bot authenticated");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let client = SocketModeClient::new(
            Arc::clone(&self.api),
            self.config.app_token.clone(),
            self.config.reconnect_delay,
        );
        let handle = tokio::spawn(client.run(tx));

        if let Some(previous) = self.receiver.lock().await.replace(handle) {
            previous.abort();
        }

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn say(&self, thread: &ThreadKey, text: &str) -> Result<(), ChannelError> {
        self.api
            .post_message(&thread.channel_id, thread.thread_ts.as_deref(), text)
            .await?;
        Ok(())
    }

    async fn set_title(&self, thread: &ThreadKey, title: &str) -> Result<(), ChannelError> {
        let Some(ts) = thread.thread_ts.as_deref() else {
            tracing::debug!(thread = %thread, "No assistant thread, skipping title");
            return Ok(());
        };
        self.api
            .set_thread_title(&thread.channel_id, ts, title)
            .await
    }

    async fn send_status(
        &self,
        thread: &ThreadKey,
        status: StatusUpdate,
    ) -> Result<(), ChannelError> {
        let Some(ts) = thread.thread_ts.as_deref() else {
            return Ok(());
        };
        let text = match &status {
            StatusUpdate::Thinking(text) => text.as_str(),
            StatusUpdate::Clear => "",
        };
        self.api
            .set_thread_status(&thread.channel_id, ts, text)
            .await
    }

    async fn set_suggested_prompts(
        &self,
        thread: &ThreadKey,
        prompts: &[SuggestedPrompt],
    ) -> Result<(), ChannelError> {
        let Some(ts) = thread.thread_ts.as_deref() else {
            return Ok(());
        };
        self.api
            .set_suggested_prompts(&thread.channel_id, ts, prompts, None)
            .await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let running = self
            .receiver
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if running {
            Ok(())
        } else {
            Err(ChannelError::HealthCheckFailed {
                name: "slack".to_string(),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        if let Some(handle) = self.receiver.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}
