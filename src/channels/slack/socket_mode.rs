//! Slack Socket Mode receiver.
//!
//! Opens a WebSocket with the app-level token, acknowledges every envelope,
//! and forwards the assistant events it understands. Reconnects whenever
//! Slack asks it to (or the socket drops) until the receiving side of the
//! event channel goes away.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::channels::AssistantEvent;
use crate::channels::slack::SlackApi;
use crate::channels::slack::types::{EventCallback, SocketAck, SocketEnvelope};
use crate::error::ChannelError;

/// What to do with one text frame.
#[derive(Debug)]
pub enum FrameAction {
    /// Acknowledge the envelope, then forward the event if any.
    Ack {
        envelope_id: String,
        event: Option<AssistantEvent>,
    },
    /// Slack is about to close the socket; open a new one.
    Reconnect { reason: String },
    /// Nothing to do (`hello`, frames without an envelope ID).
    Ignore,
}

/// Interpret a Socket Mode text frame.
pub fn handle_frame(text: &str) -> Result<FrameAction, ChannelError> {
    let envelope: SocketEnvelope = serde_json::from_str(text)
        .map_err(|e| ChannelError::InvalidMessage(format!("Bad Socket Mode frame: {}", e)))?;

    match envelope.envelope_type.as_str() {
        "hello" => {
            tracing::info!("Slack Socket Mode connection established");
            Ok(FrameAction::Ignore)
        }
        "disconnect" => Ok(FrameAction::Reconnect {
            reason: envelope.reason.unwrap_or_else(|| "unspecified".to_string()),
        }),
        kind => {
            let Some(envelope_id) = envelope.envelope_id else {
                tracing::debug!(kind, "Ignoring Socket Mode frame without envelope_id");
                return Ok(FrameAction::Ignore);
            };

            let event = if kind == "events_api" {
                envelope.payload.and_then(|payload| {
                    match serde_json::from_value::<EventCallback>(payload) {
                        Ok(callback) => {
                            tracing::debug!(
                                event_id = callback.event_id.as_deref().unwrap_or(""),
                                retry = envelope.retry_attempt.unwrap_or(0),
                                "Received Events API callback"
                            );
                            callback.event.into_assistant_event()
                        }
                        Err(e) => {
                            tracing::warn!("Unparseable Events API payload: {}", e);
                            None
                        }
                    }
                })
            } else {
                tracing::debug!(kind, "Acknowledging unsupported envelope type");
                None
            };

            Ok(FrameAction::Ack { envelope_id, event })
        }
    }
}

/// Long-running Socket Mode connection loop.
pub struct SocketModeClient {
    api: Arc<SlackApi>,
    app_token: SecretString,
    reconnect_delay: Duration,
}

/// Why a single connection ended.
enum SessionEnd {
    Reconnect,
    ReceiverGone,
}

impl SocketModeClient {
    pub fn new(api: Arc<SlackApi>, app_token: SecretString, reconnect_delay: Duration) -> Self {
        Self {
            api,
            app_token,
            reconnect_delay,
        }
    }

    /// Run until `tx` is closed.
    pub async fn run(self, tx: mpsc::Sender<AssistantEvent>) {
        loop {
            match self.session(&tx).await {
                Ok(SessionEnd::ReceiverGone) => {
                    tracing::info!("Event receiver closed, stopping Socket Mode client");
                    return;
                }
                Ok(SessionEnd::Reconnect) => {
                    tracing::info!("Reconnecting Socket Mode client");
                }
                Err(e) => {
                    tracing::error!(
                        "Socket Mode connection failed: {}, retrying in {:?}",
                        e,
                        self.reconnect_delay
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
            if tx.is_closed() {
                return;
            }
        }
    }

    async fn session(
        &self,
        tx: &mpsc::Sender<AssistantEvent>,
    ) -> Result<SessionEnd, ChannelError> {
        let url = self.api.open_socket_connection(&self.app_token).await?;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Disconnected {
                name: "slack".to_string(),
                reason: format!("WebSocket connect failed: {}", e),
            })?;
        let (mut write, mut read) = ws.split();

        while let Some(frame) = read.next().await {
            let frame = frame.map_err(|e| ChannelError::Disconnected {
                name: "slack".to_string(),
                reason: e.to_string(),
            })?;

            let text = match frame {
                Message::Text(text) => text,
                // tungstenite answers pings on the next read/write
                Message::Close(close) => {
                    tracing::info!("Slack closed the socket: {:?}", close);
                    return Ok(SessionEnd::Reconnect);
                }
                _ => continue,
            };

            let action = match handle_frame(text.as_str()) {
                Ok(action) => action,
                Err(e) => {
                    tracing::warn!("{}", e);
                    continue;
                }
            };

            match action {
                FrameAction::Ignore => {}
                FrameAction::Reconnect { reason } => {
                    tracing::info!(reason, "Slack requested disconnect");
                    return Ok(SessionEnd::Reconnect);
                }
                FrameAction::Ack { envelope_id, event } => {
                    let ack = serde_json::to_string(&SocketAck {
                        envelope_id: &envelope_id,
                    })
                    .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;
                    write
                        .send(Message::Text(ack.into()))
                        .await
                        .map_err(|e| ChannelError::Disconnected {
                            name: "slack".to_string(),
                            reason: format!("Failed to ack envelope: {}", e),
                        })?;

                    if let Some(event) = event {
                        if tx.send(event).await.is_err() {
                            return Ok(SessionEnd::ReceiverGone);
                        }
                    }
                }
            }
        }

        Ok(SessionEnd::Reconnect)
    }
}
