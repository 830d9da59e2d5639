//! Types for Slack Socket Mode envelopes, Events API payloads and Web API
//! responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channels::{AssistantEvent, ThreadEvent, UserMessage};
use crate::context::{ChannelContext, ThreadKey};

/// A Socket Mode frame.
#[derive(Debug, Deserialize)]
pub struct SocketEnvelope {
    /// `hello`, `events_api`, `disconnect`, `slash_commands`, ...
    #[serde(rename = "type")]
    pub envelope_type: String,

    /// Present on frames that must be acknowledged.
    #[serde(default)]
    pub envelope_id: Option<String>,

    #[serde(default)]
    pub payload: Option<Value>,

    /// Disconnect reason (`warning`, `refresh_requested`, `link_disabled`).
    #[serde(default)]
    pub reason: Option<String>,

    #[serde(default)]
    pub retry_attempt: Option<u32>,
}

/// Events API callback wrapper carried in an `events_api` envelope.
#[derive(Debug, Deserialize)]
pub struct EventCallback {
    #[serde(default)]
    pub team_id: Option<String>,

    #[serde(default)]
    pub event_id: Option<String>,

    pub event: SlackEvent,
}

/// Events the relay understands. Everything else lands in `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum SlackEvent {
    #[serde(rename = "assistant_thread_started")]
    AssistantThreadStarted { assistant_thread: AssistantThread },

    #[serde(rename = "assistant_thread_context_changed")]
    AssistantThreadContextChanged { assistant_thread: AssistantThread },

    #[serde(rename = "message")]
    Message(MessageEvent),

    #[serde(other)]
    Other,
}

/// The `assistant_thread` object of assistant thread events.
#[derive(Debug, Deserialize)]
pub struct AssistantThread {
    #[serde(default)]
    pub user_id: Option<String>,

    pub channel_id: String,

    pub thread_ts: String,

    #[serde(default)]
    pub context: ChannelContext,
}

/// A `message` event.
#[derive(Debug, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub channel: Option<String>,

    /// `im`, `channel`, `group`, `mpim`.
    #[serde(default)]
    pub channel_type: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub ts: Option<String>,

    #[serde(default)]
    pub thread_ts: Option<String>,

    /// Set when the message was posted by a bot (including ourselves).
    #[serde(default)]
    pub bot_id: Option<String>,

    /// `message_changed`, `channel_join`, `bot_message`, ...
    #[serde(default)]
    pub subtype: Option<String>,
}

impl AssistantThread {
    fn into_thread_event(self) -> ThreadEvent {
        ThreadEvent::new(
            ThreadKey::new(self.channel_id, self.thread_ts),
            self.user_id,
            self.context,
        )
    }
}

impl SlackEvent {
    /// Convert into a relay event. Returns `None` for events the relay
    /// ignores: bot messages, edits and other subtypes, non-DM messages and
    /// unknown event types.
    pub fn into_assistant_event(self) -> Option<AssistantEvent> {
        match self {
            SlackEvent::AssistantThreadStarted { assistant_thread } => Some(
                AssistantEvent::ThreadStarted(assistant_thread.into_thread_event()),
            ),
            SlackEvent::AssistantThreadContextChanged { assistant_thread } => Some(
                AssistantEvent::ThreadContextChanged(assistant_thread.into_thread_event()),
            ),
            SlackEvent::Message(msg) => msg.into_user_message().map(AssistantEvent::UserMessage),
            SlackEvent::Other => None,
        }
    }
}

impl MessageEvent {
    fn into_user_message(self) -> Option<UserMessage> {
        if self.bot_id.is_some() || self.subtype.is_some() {
            return None;
        }
        if self.channel_type.as_deref() != Some("im") {
            return None;
        }

        let channel = self.channel?;
        let text = self.text.filter(|t| !t.trim().is_empty())?;

        // Messages outside an assistant thread share one context per DM.
        let thread = match self.thread_ts {
            Some(ts) => ThreadKey::new(channel, ts),
            None => ThreadKey::channel(channel),
        };

        Some(UserMessage::new(thread, self.user, text))
    }
}

/// Acknowledgement sent back for every envelope with an ID.
#[derive(Debug, Serialize)]
pub struct SocketAck<'a> {
    pub envelope_id: &'a str,
}

/// `auth.test` response.
#[derive(Debug, Deserialize)]
pub struct AuthTestResponse {
    pub user_id: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

/// `chat.postMessage` response.
#[derive(Debug, Deserialize)]
pub struct PostMessageResponse {
    pub ts: String,
}

/// `apps.connections.open` response.
#[derive(Debug, Deserialize)]
pub struct ConnectionsOpenResponse {
    pub url: String,
}

/// `conversations.replies` response.
#[derive(Debug, Deserialize)]
pub struct RepliesResponse {
    #[serde(default)]
    pub messages: Vec<ReplyMessage>,
}

/// A message returned by `conversations.replies`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyMessage {
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
}

/// Slack message metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub event_type: String,
    #[serde(default)]
    pub event_payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(event: Value) -> Option<AssistantEvent> {
        serde_json::from_value::<SlackEvent>(event)
            .unwrap()
            .into_assistant_event()
    }

    #[test]
    fn test_thread_started_with_channel_context() {
        let event = parse(json!({
            "type": "assistant_thread_started",
            "assistant_thread": {
                "user_id": "U1",
                "context": {"channel_id": "C9", "team_id": "T1"},
                "channel_id": "D1",
                "thread_ts": "1729999327.187299"
            },
            "event_ts": "1715873754.429808"
        }));

        match event {
            Some(AssistantEvent::ThreadStarted(started)) => {
                assert_eq!(started.thread, ThreadKey::new("D1", "1729999327.187299"));
                assert_eq!(started.user_id.as_deref(), Some("U1"));
                assert!(started.context.has_channel());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_thread_started_without_context() {
        let event = parse(json!({
            "type": "assistant_thread_started",
            "assistant_thread": {"channel_id": "D1", "thread_ts": "1.0"}
        }));
        match event {
            Some(AssistantEvent::ThreadStarted(started)) => {
                assert!(!started.context.has_channel());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_context_changed() {
        let event = parse(json!({
            "type": "assistant_thread_context_changed",
            "assistant_thread": {
                "channel_id": "D1",
                "thread_ts": "1.0",
                "context": {"channel_id": "C2"}
            }
        }));
        assert!(matches!(event, Some(AssistantEvent::ThreadContextChanged(_))));
    }

    #[test]
    fn test_user_message_in_assistant_thread() {
        let event = parse(json!({
            "type": "message",
            "channel": "D1",
            "channel_type": "im",
            "user": "U1",
            "text": "Hello",
            "ts": "2.0",
            "thread_ts": "1.0"
        }));
        match event {
            Some(AssistantEvent::UserMessage(msg)) => {
                assert_eq!(msg.thread, ThreadKey::new("D1", "1.0"));
                assert_eq!(msg.text, "Hello");
                assert_eq!(msg.user_id.as_deref(), Some("U1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_top_level_dm_keys_by_channel() {
        let event = parse(json!({
            "type": "message",
            "channel": "D1",
            "channel_type": "im",
            "user": "U1",
            "text": "Hi",
            "ts": "2.0"
        }));
        match event {
            Some(AssistantEvent::UserMessage(msg)) => {
                assert_eq!(msg.thread, ThreadKey::channel("D1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_bot_and_subtype_messages_are_dropped() {
        assert!(
            parse(json!({
                "type": "message", "channel": "D1", "channel_type": "im",
                "bot_id": "B1", "text": "Hi there!", "thread_ts": "1.0"
            }))
            .is_none()
        );
        assert!(
            parse(json!({
                "type": "message", "channel": "D1", "channel_type": "im",
                "subtype": "message_changed", "thread_ts": "1.0"
            }))
            .is_none()
        );
    }

    #[test]
    fn test_channel_messages_and_empty_text_are_dropped() {
        assert!(
            parse(json!({
                "type": "message", "channel": "C1", "channel_type": "channel",
                "user": "U1", "text": "Hello"
            }))
            .is_none()
        );
        assert!(
            parse(json!({
                "type": "message", "channel": "D1", "channel_type": "im",
                "user": "U1", "text": "   "
            }))
            .is_none()
        );
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert!(parse(json!({"type": "app_home_opened", "user": "U1"})).is_none());
    }

    #[test]
    fn test_envelope_parsing() {
        let envelope: SocketEnvelope = serde_json::from_value(json!({
            "envelope_id": "abc-123",
            "type": "events_api",
            "accepts_response_payload": false,
            "payload": {"event": {"type": "app_mention"}}
        }))
        .unwrap();
        assert_eq!(envelope.envelope_type, "events_api");
        assert_eq!(envelope.envelope_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_ack_serialization() {
        let ack = serde_json::to_string(&SocketAck { envelope_id: "abc" }).unwrap();
        assert_eq!(ack, r#"{"envelope_id":"abc"}"#);
    }
}
