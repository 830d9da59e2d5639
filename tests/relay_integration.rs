//! End-to-end relay behavior through the public API, using the recording
//! doubles in place of Slack and OpenAI.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

use assistant_relay::agent::Dispatcher;
use assistant_relay::channels::{AssistantEvent, Channel, ThreadEvent, UserMessage};
use assistant_relay::config::{ContextStoreKind, RelayConfig};
use assistant_relay::context::{ChannelContext, ContextStore, ThreadKey};
use assistant_relay::llm::{MessageRole, RunStatus, ThreadMessage};
use assistant_relay::relay::{ConversationRelay, PollPolicy, replies};
use assistant_relay::testing::{
    Call, CallLog, RecordingChannel, RecordingContextStore, ScriptedRunApi,
};

fn relay_config() -> RelayConfig {
    RelayConfig {
        assistant_id: "asst_integration".to_string(),
        context_store: ContextStoreKind::Memory,
        poll: PollPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            multiplier: 2.0,
            max_wait: Duration::from_secs(5),
        },
    }
}

fn thread() -> ThreadKey {
    ThreadKey::new("D42", "1700000000.000100")
}

fn viewing_channel() -> ChannelContext {
    ChannelContext {
        channel_id: Some("C_GENERAL".to_string()),
        team_id: Some("T1".to_string()),
        enterprise_id: None,
    }
}

fn answering(log: &CallLog, text: &str) -> ScriptedRunApi {
    ScriptedRunApi::new(log.clone())
        .with_statuses(vec![RunStatus::Queued, RunStatus::InProgress])
        .with_fallback(RunStatus::Completed)
        .with_messages(vec![ThreadMessage::new("msg", MessageRole::Assistant, text)])
}

#[tokio::test]
async fn test_full_conversation() {
    let log = CallLog::default();
    let channel: Arc<dyn Channel> = Arc::new(RecordingChannel::new(log.clone()));
    let contexts = Arc::new(RecordingContextStore::new(log.clone()));
    let relay = ConversationRelay::new(
        channel,
        Arc::new(answering(&log, "Rust is a systems language.")),
        contexts.clone(),
        relay_config(),
    );

    relay
        .handle(AssistantEvent::ThreadStarted(ThreadEvent::new(
            thread(),
            Some("U1".to_string()),
            viewing_channel(),
        )))
        .await;
    relay
        .handle(AssistantEvent::UserMessage(UserMessage::new(
            thread(),
            Some("U1".to_string()),
            "What is Rust?",
        )))
        .await;
    relay
        .handle(AssistantEvent::UserMessage(UserMessage::new(
            thread(),
            Some("U1".to_string()),
            "Tell me more",
        )))
        .await;

    let calls = log.calls();
    assert_eq!(
        calls[0],
        Call::Say {
            thread: thread(),
            text: replies::GREETING.to_string(),
        }
    );
    assert!(calls.contains(&Call::SetSuggestedPrompts {
        thread: thread(),
        count: 2,
    }));

    // One remote thread serves the whole conversation.
    assert_eq!(log.count(|c| matches!(c, Call::CreateThread { .. })), 1);
    let appended: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            Call::AppendMessage { thread_id, text, .. } => Some((thread_id.as_str(), text.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(
        appended,
        vec![("thread_1", "What is Rust?"), ("thread_1", "Tell me more")]
    );
    assert!(calls.contains(&Call::CreateRun {
        thread_id: "thread_1".to_string(),
        assistant_id: "asst_integration".to_string(),
    }));

    let stored = assert_ok!(contexts.inner().load(&thread()).await).expect("context stored");
    assert_eq!(stored.remote_thread_id(), Some("thread_1"));
    assert_eq!(stored.channel_context().channel_id.as_deref(), Some("C_GENERAL"));
}

#[tokio::test]
async fn test_dispatcher_serializes_one_thread() {
    let log = CallLog::default();
    let events = (0..4)
        .map(|i| {
            AssistantEvent::UserMessage(UserMessage::new(
                thread(),
                Some("U1".to_string()),
                format!("question {}", i),
            ))
        })
        .collect();
    let channel: Arc<dyn Channel> =
        Arc::new(RecordingChannel::new(log.clone()).with_events(events));
    let runs = answering(&log, "answer").with_create_delay(Duration::from_millis(20));
    let relay = Arc::new(ConversationRelay::new(
        Arc::clone(&channel),
        Arc::new(runs),
        Arc::new(RecordingContextStore::new(log.clone())),
        relay_config(),
    ));

    assert_ok!(Dispatcher::new(channel, relay).run().await);

    assert_eq!(log.count(|c| matches!(c, Call::CreateThread { .. })), 1);
    assert_eq!(log.count(|c| matches!(c, Call::AppendMessage { .. })), 4);
    assert_eq!(
        log.count(|c| matches!(c, Call::Say { text, .. } if text == "answer")),
        4
    );
}

#[tokio::test]
async fn test_stuck_run_is_cancelled_with_timeout_apology() {
    let log = CallLog::default();
    let mut config = relay_config();
    config.poll.max_wait = Duration::from_millis(30);
    let relay = ConversationRelay::new(
        Arc::new(RecordingChannel::new(log.clone())),
        Arc::new(ScriptedRunApi::new(log.clone())),
        Arc::new(RecordingContextStore::new(log.clone())),
        config,
    );

    relay
        .handle(AssistantEvent::UserMessage(UserMessage::new(
            thread(),
            None,
            "Hello",
        )))
        .await;

    let said: Vec<_> = log
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Say { text, .. } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(said, vec![replies::TIMED_OUT_REPLY.to_string()]);
    assert!(log.calls().contains(&Call::CancelRun {
        thread_id: "thread_1".to_string(),
        run_id: "run_1".to_string(),
    }));
}
