//! Thread identity and context blob.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifies a workspace conversation thread.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ThreadKey {
    /// Channel (or DM conversation) ID.
    pub channel_id: String,
    /// Timestamp of the thread's parent message. `None` for top-level
    /// direct messages, which share one context per conversation.
    pub thread_ts: Option<String>,
}

impl ThreadKey {
    /// Key for a threaded conversation.
    pub fn new(channel_id: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_ts: Some(thread_ts.into()),
        }
    }

    /// Key for a conversation without a parent thread.
    pub fn channel(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_ts: None,
        }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.thread_ts {
            Some(ts) => write!(f, "{}:{}", self.channel_id, ts),
            None => write!(f, "{}", self.channel_id),
        }
    }
}

/// The channel the user was viewing when they opened the assistant thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_id: Option<String>,
}

impl ChannelContext {
    /// Whether the thread was opened from inside a channel.
    pub fn has_channel(&self) -> bool {
        self.channel_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// Opaque key-value context persisted per workspace thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadContext(Map<String, Value>);

impl ThreadContext {
    /// Key under which the remote assistant thread ID is kept.
    pub const REMOTE_THREAD_ID: &'static str = "remote_thread_id";

    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context holding the reported channel context.
    pub fn from_channel_context(context: &ChannelContext) -> Self {
        let mut map = Map::new();
        if let Some(id) = &context.channel_id {
            map.insert("channel_id".to_string(), Value::String(id.clone()));
        }
        if let Some(id) = &context.team_id {
            map.insert("team_id".to_string(), Value::String(id.clone()));
        }
        if let Some(id) = &context.enterprise_id {
            map.insert("enterprise_id".to_string(), Value::String(id.clone()));
        }
        Self(map)
    }

    /// Remote assistant thread backing this conversation, if one was created.
    pub fn remote_thread_id(&self) -> Option<&str> {
        self.0
            .get(Self::REMOTE_THREAD_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn set_remote_thread_id(&mut self, id: impl Into<String>) {
        self.0
            .insert(Self::REMOTE_THREAD_ID.to_string(), Value::String(id.into()));
    }

    /// Copy the remote thread ID from a previously stored context.
    pub fn carry_remote_thread(&mut self, previous: &ThreadContext) {
        if self.remote_thread_id().is_none() {
            if let Some(id) = previous.remote_thread_id() {
                self.set_remote_thread_id(id);
            }
        }
    }

    /// Channel context recorded in this blob.
    pub fn channel_context(&self) -> ChannelContext {
        let field = |name: &str| self.0.get(name).and_then(Value::as_str).map(String::from);
        ChannelContext {
            channel_id: field("channel_id"),
            team_id: field("team_id"),
            enterprise_id: field("enterprise_id"),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ThreadContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
