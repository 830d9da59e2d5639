//! Slack Web API client.
//!
//! Thin wrapper over the handful of Web API methods the relay needs. Every
//! call is a POST to `{base_url}/{method}`; Slack reports failures in the
//! `ok`/`error` fields of a 200 response, so both layers are checked.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::channels::SuggestedPrompt;
use crate::channels::slack::types::{
    AuthTestResponse, ConnectionsOpenResponse, MessageMetadata, PostMessageResponse,
    RepliesResponse, ReplyMessage,
};
use crate::config::SlackConfig;
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "slack";

/// Request body for a Web API call.
enum Payload<'a> {
    Json(&'a Value),
    Form(&'a [(&'a str, String)]),
    Empty,
}

/// Slack Web API client authenticated with the bot token.
pub struct SlackApi {
    client: Client,
    base_url: String,
    bot_token: SecretString,
    bot_user_id: OnceCell<String>,
}

impl SlackApi {
    /// Create a new client from the Slack configuration.
    pub fn new(config: &SlackConfig) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.to_string(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            bot_user_id: OnceCell::new(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<R: DeserializeOwned>(
        &self,
        token: &SecretString,
        method: &str,
        payload: Payload<'_>,
    ) -> Result<R, ChannelError> {
        let url = self.method_url(method);
        tracing::debug!("Slack API: POST {}", method);

        let request = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret());
        let request = match payload {
            Payload::Json(body) => request.json(body),
            Payload::Form(params) => request.form(params),
            Payload::Empty => request,
        };

        let response = request.send().await.map_err(|e| ChannelError::SendFailed {
            name: CHANNEL_NAME.to_string(),
            reason: format!("{} request failed: {}", method, e),
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ChannelError::SendFailed {
                name: CHANNEL_NAME.to_string(),
                reason: format!("{} returned HTTP {}: {}", method, status, text),
            });
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            ChannelError::InvalidMessage(format!("{} returned invalid JSON: {}", method, e))
        })?;

        if !parsed["ok"].as_bool().unwrap_or(false) {
            let error = parsed["error"].as_str().unwrap_or("unknown_error");
            return Err(ChannelError::ApiError {
                method: method.to_string(),
                error: error.to_string(),
            });
        }

        serde_json::from_value(parsed).map_err(|e| {
            ChannelError::InvalidMessage(format!("{} response did not match: {}", method, e))
        })
    }

    async fn call_bot<R: DeserializeOwned>(
        &self,
        method: &str,
        payload: Payload<'_>,
    ) -> Result<R, ChannelError> {
        self.call(&self.bot_token, method, payload).await
    }

    /// Verify the bot token and return the identity it belongs to.
    pub async fn auth_test(&self) -> Result<AuthTestResponse, ChannelError> {
        self.call_bot("auth.test", Payload::Empty).await
    }

    /// User ID of the bot, resolved once via `auth.test`.
    pub async fn bot_user_id(&self) -> Result<&str, ChannelError> {
        self.bot_user_id
            .get_or_try_init(|| async { self.auth_test().await.map(|auth| auth.user_id) })
            .await
            .map(String::as_str)
    }

    /// Post a message, optionally as a threaded reply. Returns its `ts`.
    pub async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<String, ChannelError> {
        let mut body = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = Value::String(ts.to_string());
        }

        let response: PostMessageResponse =
            self.call_bot("chat.postMessage", Payload::Json(&body)).await?;
        Ok(response.ts)
    }

    /// Set the title of an assistant thread.
    pub async fn set_thread_title(
        &self,
        channel: &str,
        thread_ts: &str,
        title: &str,
    ) -> Result<(), ChannelError> {
        let body = json!({
            "channel_id": channel,
            "thread_ts": thread_ts,
            "title": title,
        });
        self.call_bot::<Value>("assistant.threads.setTitle", Payload::Json(&body))
            .await?;
        Ok(())
    }

    /// Set (or clear, with an empty string) the assistant thread status.
    pub async fn set_thread_status(
        &self,
        channel: &str,
        thread_ts: &str,
        status: &str,
    ) -> Result<(), ChannelError> {
        let body = json!({
            "channel_id": channel,
            "thread_ts": thread_ts,
            "status": status,
        });
        self.call_bot::<Value>("assistant.threads.setStatus", Payload::Json(&body))
            .await?;
        Ok(())
    }

    /// Offer suggested prompts in an assistant thread.
    pub async fn set_suggested_prompts(
        &self,
        channel: &str,
        thread_ts: &str,
        prompts: &[SuggestedPrompt],
        title: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({
            "channel_id": channel,
            "thread_ts": thread_ts,
            "prompts": prompts,
        });
        if let Some(title) = title {
            body["title"] = Value::String(title.to_string());
        }
        self.call_bot::<Value>(
            "assistant.threads.setSuggestedPrompts",
            Payload::Json(&body),
        )
        .await?;
        Ok(())
    }

    /// Fetch the first replies of a thread, including message metadata.
    pub async fn conversation_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: u32,
    ) -> Result<Vec<ReplyMessage>, ChannelError> {
        let params = [
            ("channel", channel.to_string()),
            ("ts", thread_ts.to_string()),
            ("oldest", thread_ts.to_string()),
            ("include_all_metadata", "true".to_string()),
            ("limit", limit.to_string()),
        ];
        let response: RepliesResponse = self
            .call_bot("conversations.replies", Payload::Form(&params))
            .await?;
        Ok(response.messages)
    }

    /// Rewrite a message's metadata, keeping its text.
    pub async fn update_message_metadata(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        metadata: &MessageMetadata,
    ) -> Result<(), ChannelError> {
        let body = json!({
            "channel": channel,
            "ts": ts,
            "text": text,
            "metadata": metadata,
        });
        self.call_bot::<Value>("chat.update", Payload::Json(&body))
            .await?;
        Ok(())
    }

    /// Request a Socket Mode WebSocket URL using the app-level token.
    pub async fn open_socket_connection(
        &self,
        app_token: &SecretString,
    ) -> Result<String, ChannelError> {
        let response: ConnectionsOpenResponse = self
            .call(app_token, "apps.connections.open", Payload::Empty)
            .await?;
        Ok(response.url)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(base_url: &str) -> SlackConfig {
        SlackConfig {
            bot_token: SecretString::from("xoxb-test"),
            app_token: SecretString::from("xapp-test"),
            api_base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_method_url_trims_trailing_slash() {
        let api = SlackApi::new(&config("https://slack.example/api/")).unwrap();
        assert_eq!(
            api.method_url("chat.postMessage"),
            "https://slack.example/api/chat.postMessage"
        );
    }

    #[test]
    fn test_suggested_prompts_serialize_as_slack_expects() {
        let prompts = vec![SuggestedPrompt::new("Summarize", "Summarize this channel")];
        let body = json!({ "prompts": prompts });
        assert_eq!(
            body["prompts"][0],
            json!({"title": "Summarize", "message": "Summarize this channel"})
        );
    }

    #[tokio::test]
    async fn test_post_message_replies_in_thread() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_partial_json(json!({
                "channel": "D1",
                "thread_ts": "1.0",
                "text": "Hi there!"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "ts": "2.0"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let api = SlackApi::new(&config(&server.uri())).unwrap();

        let ts = api.post_message("D1", Some("1.0"), "Hi there!").await.unwrap();
        assert_eq!(ts, "2.0");
    }

    #[tokio::test]
    async fn test_not_ok_response_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistant.threads.setTitle"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "not_allowed_token_type"})),
            )
            .mount(&server)
            .await;
        let api = SlackApi::new(&config(&server.uri())).unwrap();

        match api.set_thread_title("D1", "1.0", "Hello").await {
            Err(ChannelError::ApiError { method, error }) => {
                assert_eq!(method, "assistant.threads.setTitle");
                assert_eq!(error, "not_allowed_token_type");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_failure_maps_to_send_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;
        let api = SlackApi::new(&config(&server.uri())).unwrap();

        match api.post_message("D1", None, "hi").await {
            Err(ChannelError::SendFailed { reason, .. }) => {
                assert!(reason.contains("500"), "reason: {reason}");
            }
            other => panic!("expected send failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_socket_connection_uses_app_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps.connections.open"))
            .and(header("authorization", "Bearer xapp-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "url": "wss://wss-primary.slack.com/link/?ticket=abc"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let config = config(&server.uri());
        let api = SlackApi::new(&config).unwrap();

        let url = api.open_socket_connection(&config.app_token).await.unwrap();
        assert_eq!(url, "wss://wss-primary.slack.com/link/?ticket=abc");
    }
}
