//! Event dispatch loop.
//!
//! Pulls events off the channel stream and hands each one to the relay on
//! its own task, so a handler waiting on a run never holds up other
//! conversations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinSet;

use crate::channels::Channel;
use crate::error::ChannelError;
use crate::relay::ConversationRelay;

/// How often the channel is asked whether it is still healthy.
const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(60);

/// Connects a channel's event stream to the relay.
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    relay: Arc<ConversationRelay>,
    health_interval: Duration,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn Channel>, relay: Arc<ConversationRelay>) -> Self {
        Self {
            channel,
            relay,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }

    /// Set how often the channel's health is checked while dispatching.
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Dispatch until the event stream ends.
    pub async fn run(&self) -> Result<(), ChannelError> {
        self.run_until(std::future::pending()).await
    }

    /// Dispatch until the stream ends or `shutdown` resolves.
    ///
    /// On a shutdown signal in-flight handlers are aborted. When the stream
    /// simply ends, in-flight handlers are allowed to finish.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ChannelError>
    where
        F: Future<Output = ()>,
    {
        let mut events = self.channel.start().await?;
        tracing::info!(channel = self.channel.name(), "Dispatching assistant events");

        let mut handlers = JoinSet::new();
        tokio::pin!(shutdown);

        let mut health = tokio::time::interval(self.health_interval);
        // Skip the first immediate tick
        health.tick().await;

        loop {
            tokio::select! {
                event = events.next() => {
                    let Some(event) = event else {
                        tracing::info!("Event stream ended");
                        break;
                    };
                    tracing::debug!(kind = event.kind(), thread = %event.thread(), "Dispatching event");
                    let relay = Arc::clone(&self.relay);
                    handlers.spawn(async move { relay.handle(event).await });
                }
                Some(result) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = result {
                        tracing::error!("Event handler panicked: {}", e);
                    }
                }
                _ = health.tick() => {
                    if let Err(e) = self.channel.health_check().await {
                        tracing::warn!(channel = self.channel.name(), "Channel unhealthy: {}", e);
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!(in_flight = handlers.len(), "Shutdown requested");
                    handlers.shutdown().await;
                    return self.channel.shutdown().await;
                }
            }
        }

        // Drain, still honoring the shutdown signal.
        while !handlers.is_empty() {
            tokio::select! {
                Some(result) = handlers.join_next() => {
                    if let Err(e) = result {
                        tracing::error!("Event handler panicked: {}", e);
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!(in_flight = handlers.len(), "Shutdown requested while draining");
                    handlers.shutdown().await;
                    break;
                }
            }
        }
        self.channel.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channels::{AssistantEvent, ThreadEvent, UserMessage};
    use crate::config::{ContextStoreKind, RelayConfig};
    use crate::context::{ChannelContext, ThreadKey};
    use crate::llm::{MessageRole, RunStatus, ThreadMessage};
    use crate::relay::{PollPolicy, replies};
    use crate::testing::{Call, CallLog, RecordingChannel, RecordingContextStore, ScriptedRunApi};

    fn relay_config() -> RelayConfig {
        RelayConfig {
            assistant_id: "asst_1".to_string(),
            context_store: ContextStoreKind::Memory,
            poll: PollPolicy {
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(1),
                multiplier: 1.0,
                max_wait: Duration::from_secs(5),
            },
        }
    }

    #[tokio::test]
    async fn test_every_event_is_handled() {
        let log = CallLog::default();
        let events = vec![
            AssistantEvent::ThreadStarted(ThreadEvent::new(
                ThreadKey::new("D1", "1.0"),
                None,
                ChannelContext::default(),
            )),
            AssistantEvent::UserMessage(UserMessage::new(
                ThreadKey::new("D2", "2.0"),
                None,
                "Hello",
            )),
        ];
        let channel: Arc<dyn Channel> =
            Arc::new(RecordingChannel::new(log.clone()).with_events(events));
        let runs = ScriptedRunApi::new(log.clone())
            .with_fallback(RunStatus::Completed)
            .with_messages(vec![ThreadMessage::new("m", MessageRole::Assistant, "Hi there!")]);
        let relay = Arc::new(ConversationRelay::new(
            Arc::clone(&channel),
            Arc::new(runs),
            Arc::new(RecordingContextStore::new(log.clone())),
            relay_config(),
        ));

        Dispatcher::new(channel, relay).run().await.unwrap();

        let calls = log.calls();
        assert!(calls.contains(&Call::Say {
            thread: ThreadKey::new("D1", "1.0"),
            text: replies::GREETING.to_string(),
        }));
        assert!(calls.contains(&Call::Say {
            thread: ThreadKey::new("D2", "2.0"),
            text: "Hi there!".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_handlers() {
        let log = CallLog::default();
        let channel: Arc<dyn Channel> = Arc::new(RecordingChannel::new(log.clone()).with_events(
            vec![AssistantEvent::UserMessage(UserMessage::new(
                ThreadKey::new("D1", "1.0"),
                None,
                "Hello",
            ))],
        ));
        let mut config = relay_config();
        config.poll.max_wait = Duration::from_secs(600);
        let relay = Arc::new(ConversationRelay::new(
            Arc::clone(&channel),
            Arc::new(ScriptedRunApi::new(log.clone())),
            Arc::new(RecordingContextStore::new(log.clone())),
            config,
        ));

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            Dispatcher::new(channel, relay)
                .run_until(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await;

        assert!(result.is_ok(), "dispatcher should stop on shutdown");
        assert!(
            !log.calls().iter().any(|c| matches!(c, Call::Say { .. })),
            "stuck run must not produce a reply"
        );
        assert_eq!(log.count(|c| matches!(c, Call::Shutdown)), 1);
    }

    #[tokio::test]
    async fn test_shutdown_while_stream_open() {
        let log = CallLog::default();
        let channel: Arc<dyn Channel> = Arc::new(RecordingChannel::new(log.clone()).held_open());
        let relay = Arc::new(ConversationRelay::new(
            Arc::clone(&channel),
            Arc::new(ScriptedRunApi::new(log.clone())),
            Arc::new(RecordingContextStore::new(log.clone())),
            relay_config(),
        ));

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            Dispatcher::new(channel, relay)
                .run_until(tokio::time::sleep(Duration::from_millis(20))),
        )
        .await;

        assert!(result.is_ok(), "dispatcher should stop on shutdown");
        assert_eq!(log.count(|c| matches!(c, Call::Shutdown)), 1);
    }

    #[tokio::test]
    async fn test_channel_health_checked_periodically() {
        let log = CallLog::default();
        let channel: Arc<dyn Channel> = Arc::new(
            RecordingChannel::new(log.clone())
                .held_open()
                .unhealthy(),
        );
        let relay = Arc::new(ConversationRelay::new(
            Arc::clone(&channel),
            Arc::new(ScriptedRunApi::new(log.clone())),
            Arc::new(RecordingContextStore::new(log.clone())),
            relay_config(),
        ));

        Dispatcher::new(channel, relay)
            .with_health_interval(Duration::from_millis(10))
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        // An unhealthy channel is reported, not fatal.
        assert!(log.count(|c| matches!(c, Call::HealthCheck)) >= 2);
        assert_eq!(log.count(|c| matches!(c, Call::Shutdown)), 1);
    }
}
