//! OpenAI Assistants (v2) run API implementation.

use async_trait::async_trait;
use reqwest::{Client, Method};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::OpenAiConfig;
use crate::error::LlmError;
use crate::llm::provider::{MessageOrder, MessageRole, Run, RunApi, RunStatus, ThreadMessage};

const PROVIDER: &str = "openai";

/// Page size when listing thread messages (API maximum).
const MESSAGE_PAGE_LIMIT: u32 = 100;

/// OpenAI Assistants API client.
pub struct OpenAiAssistants {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiAssistants {
    /// Create a new client with API key auth.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Send a request to the Assistants API.
    async fn send_request<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<R, LlmError> {
        let url = self.api_url(path);

        tracing::debug!("Sending request to OpenAI: {} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(self.config.api_key.expose_secret())
            .header("OpenAI-Beta", "assistants=v2");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("OpenAI request failed: {}", e);
            LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(std::time::Duration::from_secs);
        let response_text = response.text().await.unwrap_or_default();

        tracing::debug!("OpenAI response status: {}", status);

        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthFailed {
                    provider: PROVIDER.to_string(),
                },
                404 => LlmError::NotFound {
                    provider: PROVIDER.to_string(),
                    resource: path.to_string(),
                },
                429 => LlmError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after,
                },
                _ => LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: format!("HTTP {}: {}", status, response_text),
                },
            });
        }

        serde_json::from_str(&response_text).map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: format!("JSON parse error: {}. Raw: {}", e, response_text),
        })
    }
}

#[async_trait]
impl RunApi for OpenAiAssistants {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn create_thread(&self) -> Result<String, LlmError> {
        let thread: ThreadObject = self
            .send_request(Method::POST, "threads", &[], Some(&json!({})))
            .await?;
        Ok(thread.id)
    }

    async fn append_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<(), LlmError> {
        let body = json!({ "role": role, "content": text });
        let _: MessageObject = self
            .send_request(
                Method::POST,
                &format!("threads/{}/messages", thread_id),
                &[],
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, LlmError> {
        let body = json!({ "assistant_id": assistant_id });
        let run: RunObject = self
            .send_request(
                Method::POST,
                &format!("threads/{}/runs", thread_id),
                &[],
                Some(&body),
            )
            .await?;
        Ok(run.into())
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, LlmError> {
        let run: RunObject = self
            .send_request(
                Method::GET,
                &format!("threads/{}/runs/{}", thread_id, run_id),
                &[],
                None,
            )
            .await?;
        Ok(run.into())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, LlmError> {
        let run: RunObject = self
            .send_request(
                Method::POST,
                &format!("threads/{}/runs/{}/cancel", thread_id, run_id),
                &[],
                None,
            )
            .await?;
        Ok(run.into())
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        order: MessageOrder,
        run_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>, LlmError> {
        let path = format!("threads/{}/messages", thread_id);
        let mut messages = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![
                ("order", order.as_str().to_string()),
                ("limit", MESSAGE_PAGE_LIMIT.to_string()),
            ];
            if let Some(run_id) = run_id {
                query.push(("run_id", run_id.to_string()));
            }
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let page: MessageList = self
                .send_request(Method::GET, &path, &query, None)
                .await?;

            after = page.last_id.clone();
            messages.extend(page.data.into_iter().map(ThreadMessage::from));

            if !page.has_more || after.is_none() {
                break;
            }
        }

        Ok(messages)
    }
}

// Assistants API wire types

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    thread_id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RunErrorObject {
    code: String,
    message: String,
}

impl From<RunObject> for Run {
    fn from(run: RunObject) -> Self {
        Self {
            id: run.id,
            thread_id: run.thread_id,
            status: run.status,
            last_error: run
                .last_error
                .map(|e| format!("{}: {}", e.code, e.message)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
    #[serde(default)]
    last_id: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    id: String,
    role: MessageRole,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

impl From<MessageObject> for ThreadMessage {
    fn from(msg: MessageObject) -> Self {
        let text = msg
            .content
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.value),
                ContentPart::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        ThreadMessage::new(msg.id, msg.role, text)
    }
}
