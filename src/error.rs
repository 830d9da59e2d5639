//! Error types for the relay.

use std::time::Duration;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Workspace channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Channel {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Slack API method {method} returned error: {error}")]
    ApiError { method: String, error: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Channel {name} health check failed")]
    HealthCheckFailed { name: String },
}

/// Remote run API errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Resource not found on {provider}: {resource}")]
    NotFound { provider: String, resource: String },
}

/// Thread context persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Failed to load context for {key}: {reason}")]
    LoadFailed { key: String, reason: String },

    #[error("Failed to store context for {key}: {reason}")]
    StoreFailed { key: String, reason: String },
}

/// Errors raised while relaying a single message.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Run {run_id} on thread {thread_id} did not finish within {waited:?}")]
    RunTimedOut {
        thread_id: String,
        run_id: String,
        waited: Duration,
    },
}
