//! Recording test doubles for the relay's collaborators.
//!
//! All doubles share one `CallLog`, so tests can assert on the order of
//! calls across the channel, the run API and the context store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::channels::{AssistantEvent, Channel, EventStream, StatusUpdate, SuggestedPrompt};
use crate::context::{ContextStore, InMemoryContextStore, ThreadContext, ThreadKey};
use crate::error::{ChannelError, ContextError, LlmError};
use crate::llm::{MessageOrder, MessageRole, Run, RunApi, RunStatus, ThreadMessage};

/// One observed collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Say { thread: ThreadKey, text: String },
    SetTitle { thread: ThreadKey, title: String },
    SetStatus { thread: ThreadKey, status: StatusUpdate },
    SetSuggestedPrompts { thread: ThreadKey, count: usize },
    LoadContext { thread: ThreadKey },
    StoreContext { thread: ThreadKey, remote_thread_id: Option<String> },
    CreateThread { id: String },
    AppendMessage { thread_id: String, role: MessageRole, text: String },
    CreateRun { thread_id: String, assistant_id: String },
    GetRun { thread_id: String, run_id: String },
    CancelRun { thread_id: String, run_id: String },
    ListMessages { thread_id: String, run_id: Option<String> },
    HealthCheck,
    Shutdown,
}

/// Shared, ordered record of calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

fn send_failed(what: &str) -> ChannelError {
    ChannelError::SendFailed {
        name: "recording".to_string(),
        reason: format!("{} failure injected", what),
    }
}

/// Channel that records outbound calls and replays a fixed event list.
pub struct RecordingChannel {
    log: CallLog,
    events: Mutex<Vec<AssistantEvent>>,
    hold_open: bool,
    fail_say: bool,
    fail_title: bool,
    unhealthy: bool,
}

impl RecordingChannel {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            events: Mutex::new(Vec::new()),
            hold_open: false,
            fail_say: false,
            fail_title: false,
            unhealthy: false,
        }
    }

    /// Events the stream returned by `start` yields.
    pub fn with_events(self, events: Vec<AssistantEvent>) -> Self {
        if let Ok(mut slot) = self.events.lock() {
            *slot = events;
        }
        self
    }

    /// Keep the event stream open after the scripted events, like a live
    /// connection.
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.unhealthy = true;
        self
    }

    pub fn failing_say(mut self) -> Self {
        self.fail_say = true;
        self
    }

    pub fn failing_title(mut self) -> Self {
        self.fail_title = true;
        self
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let events = self
            .events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default();
        let events: EventStream = if self.hold_open {
            Box::pin(stream::iter(events).chain(stream::pending()))
        } else {
            Box::pin(stream::iter(events))
        };
        Ok(events)
    }

    async fn say(&self, thread: &ThreadKey, text: &str) -> Result<(), ChannelError> {
        if self.fail_say {
            return Err(send_failed("say"));
        }
        self.log.push(Call::Say {
            thread: thread.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn set_title(&self, thread: &ThreadKey, title: &str) -> Result<(), ChannelError> {
        if self.fail_title {
            return Err(send_failed("set_title"));
        }
        self.log.push(Call::SetTitle {
            thread: thread.clone(),
            title: title.to_string(),
        });
        Ok(())
    }

    async fn send_status(
        &self,
        thread: &ThreadKey,
        status: StatusUpdate,
    ) -> Result<(), ChannelError> {
        self.log.push(Call::SetStatus {
            thread: thread.clone(),
            status,
        });
        Ok(())
    }

    async fn set_suggested_prompts(
        &self,
        thread: &ThreadKey,
        prompts: &[SuggestedPrompt],
    ) -> Result<(), ChannelError> {
        self.log.push(Call::SetSuggestedPrompts {
            thread: thread.clone(),
            count: prompts.len(),
        });
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.log.push(Call::HealthCheck);
        if self.unhealthy {
            return Err(ChannelError::HealthCheckFailed {
                name: "recording".to_string(),
            });
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        self.log.push(Call::Shutdown);
        Ok(())
    }
}

/// In-memory context store that records loads and stores.
pub struct RecordingContextStore {
    log: CallLog,
    inner: InMemoryContextStore,
}

impl RecordingContextStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            inner: InMemoryContextStore::new(),
        }
    }

    /// Store a context without recording the call.
    pub async fn seed(&self, key: &ThreadKey, context: ThreadContext) {
        let _ = self.inner.store(key, &context).await;
    }

    pub fn inner(&self) -> &InMemoryContextStore {
        &self.inner
    }
}

#[async_trait]
impl ContextStore for RecordingContextStore {
    async fn load(&self, key: &ThreadKey) -> Result<Option<ThreadContext>, ContextError> {
        self.log.push(Call::LoadContext { thread: key.clone() });
        self.inner.load(key).await
    }

    async fn store(&self, key: &ThreadKey, context: &ThreadContext) -> Result<(), ContextError> {
        self.log.push(Call::StoreContext {
            thread: key.clone(),
            remote_thread_id: context.remote_thread_id().map(String::from),
        });
        self.inner.store(key, context).await
    }
}

/// Run API that replays a scripted sequence of run statuses.
///
/// Each `get_run` pops the next scripted status; once the script is empty
/// it keeps returning the fallback (`InProgress` unless changed), which
/// models a stuck run.
pub struct ScriptedRunApi {
    log: CallLog,
    statuses: Mutex<VecDeque<RunStatus>>,
    fallback: RunStatus,
    messages: Vec<ThreadMessage>,
    threads: AtomicUsize,
    runs: AtomicUsize,
    create_delay: Duration,
    fail_append: bool,
}

impl ScriptedRunApi {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            statuses: Mutex::new(VecDeque::new()),
            fallback: RunStatus::InProgress,
            messages: Vec::new(),
            threads: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
            create_delay: Duration::ZERO,
            fail_append: false,
        }
    }

    pub fn with_statuses(self, statuses: Vec<RunStatus>) -> Self {
        if let Ok(mut script) = self.statuses.lock() {
            *script = statuses.into();
        }
        self
    }

    pub fn with_fallback(mut self, status: RunStatus) -> Self {
        self.fallback = status;
        self
    }

    /// Messages returned by `list_messages`.
    pub fn with_messages(mut self, messages: Vec<ThreadMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Delay `create_thread`, widening any race between handlers.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn failing_append(mut self) -> Self {
        self.fail_append = true;
        self
    }

    pub fn get_run_calls(&self) -> usize {
        self.log.count(|c| matches!(c, Call::GetRun { .. }))
    }
}

#[async_trait]
impl RunApi for ScriptedRunApi {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create_thread(&self) -> Result<String, LlmError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let id = format!("thread_{}", self.threads.fetch_add(1, Ordering::SeqCst) + 1);
        self.log.push(Call::CreateThread { id: id.clone() });
        Ok(id)
    }

    async fn append_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<(), LlmError> {
        if self.fail_append {
            return Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "append failure injected".to_string(),
            });
        }
        self.log.push(Call::AppendMessage {
            thread_id: thread_id.to_string(),
            role,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, LlmError> {
        self.log.push(Call::CreateRun {
            thread_id: thread_id.to_string(),
            assistant_id: assistant_id.to_string(),
        });
        Ok(Run {
            id: format!("run_{}", self.runs.fetch_add(1, Ordering::SeqCst) + 1),
            thread_id: thread_id.to_string(),
            status: RunStatus::Queued,
            last_error: None,
        })
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, LlmError> {
        self.log.push(Call::GetRun {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
        });
        let status = self
            .statuses
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(self.fallback);
        Ok(Run {
            id: run_id.to_string(),
            thread_id: thread_id.to_string(),
            status,
            last_error: None,
        })
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, LlmError> {
        self.log.push(Call::CancelRun {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
        });
        Ok(Run {
            id: run_id.to_string(),
            thread_id: thread_id.to_string(),
            status: RunStatus::Cancelling,
            last_error: None,
        })
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        order: MessageOrder,
        run_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>, LlmError> {
        self.log.push(Call::ListMessages {
            thread_id: thread_id.to_string(),
            run_id: run_id.map(String::from),
        });
        let mut messages = self.messages.clone();
        if order == MessageOrder::Desc {
            messages.reverse();
        }
        Ok(messages)
    }
}
