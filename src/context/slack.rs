//! Context store backed by Slack message metadata.
//!
//! The context is written into the metadata of the bot's first reply in the
//! assistant thread, so it survives restarts without a database. A process
//! cache sits in front: it answers repeat loads and holds contexts for
//! threads where the bot has not replied yet (or that have no parent
//! message, like top-level DMs). The cache is bounded; the oldest threads
//! fall back to Slack on their next load.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::channels::SlackApi;
use crate::channels::slack::types::{MessageMetadata, ReplyMessage};
use crate::context::{ContextStore, ThreadContext, ThreadKey};
use crate::error::ContextError;

/// Metadata event type marking a stored thread context.
pub const CONTEXT_EVENT_TYPE: &str = "assistant_thread_context";

/// Replies scanned when looking for the bot's first message.
const REPLY_SCAN_LIMIT: u32 = 4;

/// Threads whose context is kept in process.
const DEFAULT_CACHE_ENTRIES: usize = 1024;

/// Contexts by thread, evicting the least recently inserted thread.
struct ContextCache {
    max_entries: usize,
    entries: HashMap<ThreadKey, ThreadContext>,
    order: VecDeque<ThreadKey>,
}

impl ContextCache {
    fn with_capacity(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &ThreadKey) -> Option<&ThreadContext> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: ThreadKey, context: ThreadContext) {
        if self.entries.insert(key.clone(), context).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.max_entries {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Stores thread context in Slack message metadata.
pub struct SlackMetadataContextStore {
    api: Arc<SlackApi>,
    cache: RwLock<ContextCache>,
}

impl SlackMetadataContextStore {
    pub fn new(api: Arc<SlackApi>) -> Self {
        Self::with_cache_capacity(api, DEFAULT_CACHE_ENTRIES)
    }

    /// Create a store that keeps at most `max_entries` thread contexts in
    /// process.
    pub fn with_cache_capacity(api: Arc<SlackApi>, max_entries: usize) -> Self {
        Self {
            api,
            cache: RwLock::new(ContextCache::with_capacity(max_entries)),
        }
    }

    async fn fetch_first_bot_reply(
        &self,
        key: &ThreadKey,
        thread_ts: &str,
    ) -> Result<Option<ReplyMessage>, String> {
        let bot_user_id = self.api.bot_user_id().await.map_err(|e| e.to_string())?;
        let replies = self
            .api
            .conversation_replies(&key.channel_id, thread_ts, REPLY_SCAN_LIMIT)
            .await
            .map_err(|e| e.to_string())?;
        Ok(first_bot_reply(&replies, bot_user_id).cloned())
    }
}

/// First message in the thread authored by the bot user.
fn first_bot_reply<'a>(replies: &'a [ReplyMessage], bot_user_id: &str) -> Option<&'a ReplyMessage> {
    replies
        .iter()
        .find(|m| m.user.as_deref() == Some(bot_user_id))
}

/// Extract a stored context from a message's metadata.
fn context_from_metadata(message: &ReplyMessage) -> Option<ThreadContext> {
    let metadata = message.metadata.as_ref()?;
    if metadata.event_type != CONTEXT_EVENT_TYPE {
        return None;
    }
    match &metadata.event_payload {
        Value::Object(map) => Some(ThreadContext::from(map.clone())),
        _ => None,
    }
}

fn context_metadata(context: &ThreadContext) -> MessageMetadata {
    MessageMetadata {
        event_type: CONTEXT_EVENT_TYPE.to_string(),
        event_payload: Value::Object(context.as_map().clone()),
    }
}

#[async_trait]
impl ContextStore for SlackMetadataContextStore {
    async fn load(&self, key: &ThreadKey) -> Result<Option<ThreadContext>, ContextError> {
        if let Some(cached) = self.cache.read().await.get(key) {
            return Ok(Some(cached.clone()));
        }

        let Some(thread_ts) = key.thread_ts.as_deref() else {
            return Ok(None);
        };

        let reply = self
            .fetch_first_bot_reply(key, thread_ts)
            .await
            .map_err(|reason| ContextError::LoadFailed {
                key: key.to_string(),
                reason,
            })?;

        let context = reply.as_ref().and_then(context_from_metadata);
        if let Some(ctx) = &context {
            self.cache.write().await.insert(key.clone(), ctx.clone());
        }
        Ok(context)
    }

    async fn store(&self, key: &ThreadKey, context: &ThreadContext) -> Result<(), ContextError> {
        self.cache
            .write()
            .await
            .insert(key.clone(), context.clone());

        let Some(thread_ts) = key.thread_ts.as_deref() else {
            return Ok(());
        };

        let reply = self
            .fetch_first_bot_reply(key, thread_ts)
            .await
            .map_err(|reason| ContextError::StoreFailed {
                key: key.to_string(),
                reason,
            })?;

        let Some(reply) = reply else {
            tracing::debug!(thread = %key, "No bot reply to attach context to yet, cached only");
            return Ok(());
        };

        self.api
            .update_message_metadata(
                &key.channel_id,
                &reply.ts,
                &reply.text,
                &context_metadata(context),
            )
            .await
            .map_err(|e| ContextError::StoreFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(thread = %key, message_ts = %reply.ts, "Stored thread context in message metadata");
        Ok(())
    }
}
