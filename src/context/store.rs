//! Context store trait and in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::context::{ThreadContext, ThreadKey};
use crate::error::ContextError;

/// Persistence for per-thread context blobs.
///
/// Injected into the relay at construction. Consistency across concurrent
/// writers is the relay's job (it serializes work per thread); the store
/// only has to make a single `store` visible to later `load`s.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Load the context for a thread, `None` if nothing was stored yet.
    async fn load(&self, key: &ThreadKey) -> Result<Option<ThreadContext>, ContextError>;

    /// Replace the context for a thread.
    async fn store(&self, key: &ThreadKey, context: &ThreadContext) -> Result<(), ContextError>;
}

/// Process-local context store. Contexts are lost on restart.
pub struct InMemoryContextStore {
    contexts: RwLock<HashMap<ThreadKey, ThreadContext>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Number of threads with a stored context.
    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn load(&self, key: &ThreadKey) -> Result<Option<ThreadContext>, ContextError> {
        Ok(self.contexts.read().await.get(key).cloned())
    }

    async fn store(&self, key: &ThreadKey, context: &ThreadContext) -> Result<(), ContextError> {
        self.contexts
            .write()
            .await
            .insert(key.clone(), context.clone());
        tracing::debug!(thread = %key, "Stored thread context");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let store = InMemoryContextStore::new();
        let loaded = store.load(&ThreadKey::new("D1", "1.0")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let store = InMemoryContextStore::new();
        let key = ThreadKey::new("D1", "1.0");

        let mut ctx = ThreadContext::new();
        ctx.set_remote_thread_id("thread_1");
        store.store(&key, &ctx).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.remote_thread_id(), Some("thread_1"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_replaces_previous() {
        let store = InMemoryContextStore::new();
        let key = ThreadKey::channel("D1");

        let mut first = ThreadContext::new();
        first.set_remote_thread_id("thread_1");
        store.store(&key, &first).await.unwrap();
        store.store(&key, &ThreadContext::new()).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert!(loaded.remote_thread_id().is_none());
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let store = InMemoryContextStore::new();
        let mut ctx = ThreadContext::new();
        ctx.set_remote_thread_id("thread_1");
        store.store(&ThreadKey::new("D1", "1.0"), &ctx).await.unwrap();

        let other = store.load(&ThreadKey::new("D1", "2.0")).await.unwrap();
        assert!(other.is_none());
    }
}
