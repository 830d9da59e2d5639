//! Configuration for the relay.
//!
//! Everything comes from environment variables (a `.env` file is loaded
//! first when present). Required credentials fail fast so the process never
//! starts serving events half-configured.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::relay::PollPolicy;

/// Main configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub slack: SlackConfig,
    pub openai: OpenAiConfig,
    pub relay: RelayConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| match std::env::var(key) {
            Ok(val) if val.is_empty() => None,
            Ok(val) => Some(val),
            Err(_) => None,
        })
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };
        Ok(Self {
            slack: SlackConfig::from_env(&env)?,
            openai: OpenAiConfig::from_env(&env)?,
            relay: RelayConfig::from_env(&env)?,
        })
    }

    /// All settings as display pairs, secrets redacted.
    pub fn list(&self) -> Vec<(String, String)> {
        let poll = &self.relay.poll;
        vec![
            ("slack.bot_token".to_string(), REDACTED.to_string()),
            ("slack.app_token".to_string(), REDACTED.to_string()),
            ("slack.api_base_url".to_string(), self.slack.api_base_url.clone()),
            (
                "slack.request_timeout".to_string(),
                format!("{:?}", self.slack.request_timeout),
            ),
            (
                "slack.reconnect_delay".to_string(),
                format!("{:?}", self.slack.reconnect_delay),
            ),
            ("openai.api_key".to_string(), REDACTED.to_string()),
            ("openai.base_url".to_string(), self.openai.base_url.clone()),
            (
                "openai.request_timeout".to_string(),
                format!("{:?}", self.openai.request_timeout),
            ),
            ("relay.assistant_id".to_string(), self.relay.assistant_id.clone()),
            (
                "relay.context_store".to_string(),
                self.relay.context_store.as_str().to_string(),
            ),
            (
                "relay.poll.initial_interval".to_string(),
                format!("{:?}", poll.initial_interval),
            ),
            (
                "relay.poll.max_interval".to_string(),
                format!("{:?}", poll.max_interval),
            ),
            ("relay.poll.multiplier".to_string(), poll.multiplier.to_string()),
            (
                "relay.poll.max_wait".to_string(),
                format!("{:?}", poll.max_wait),
            ),
        ]
    }
}

const REDACTED: &str = "********";

/// Slack credentials and endpoints.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Bot token (`xoxb-`), used for Web API calls.
    pub bot_token: SecretString,
    /// App-level token (`xapp-`), used to open Socket Mode connections.
    pub app_token: SecretString,
    pub api_base_url: String,
    pub request_timeout: Duration,
    /// Delay before reconnecting after a failed Socket Mode connection.
    pub reconnect_delay: Duration,
}

impl SlackConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            bot_token: SecretString::from(env.required("SLACK_BOT_TOKEN")?),
            app_token: SecretString::from(env.required("SLACK_APP_TOKEN")?),
            api_base_url: env
                .optional("SLACK_API_BASE_URL")
                .unwrap_or_else(|| "https://slack.com/api".to_string()),
            request_timeout: Duration::from_secs(env.parse_optional("SLACK_TIMEOUT_SECS", 30)?),
            reconnect_delay: Duration::from_secs(
                env.parse_optional("SLACK_RECONNECT_DELAY_SECS", 5)?,
            ),
        })
    }
}

/// OpenAI Assistants API configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    /// Base URL without the `/v1` suffix.
    pub base_url: String,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: SecretString::from(env.required("OPENAI_API_KEY")?),
            base_url: env
                .optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            request_timeout: Duration::from_secs(env.parse_optional("OPENAI_TIMEOUT_SECS", 60)?),
        })
    }
}

/// Where thread contexts are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStoreKind {
    /// Process memory only.
    Memory,
    /// Slack message metadata (with a process cache).
    Slack,
}

impl ContextStoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextStoreKind::Memory => "memory",
            ContextStoreKind::Slack => "slack",
        }
    }
}

impl std::str::FromStr for ContextStoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Ok(Self::Memory),
            "slack" | "metadata" => Ok(Self::Slack),
            _ => Err(ConfigError::InvalidValue {
                key: "RELAY_CONTEXT_STORE".to_string(),
                message: format!("unknown store: {s}, expected 'memory' or 'slack'"),
            }),
        }
    }
}

/// Relay behavior.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Assistant every run is started against.
    pub assistant_id: String,
    pub context_store: ContextStoreKind,
    pub poll: PollPolicy,
}

impl RelayConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let context_store = env
            .optional("RELAY_CONTEXT_STORE")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(ContextStoreKind::Slack);

        let multiplier: f64 = env.parse_optional("RELAY_POLL_MULTIPLIER", 1.5)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_POLL_MULTIPLIER".to_string(),
                message: format!("must be a number >= 1.0, got {multiplier}"),
            });
        }

        let poll = PollPolicy {
            initial_interval: Duration::from_millis(
                env.parse_optional("RELAY_POLL_INITIAL_MS", 1000)?,
            ),
            max_interval: Duration::from_millis(
                env.parse_optional("RELAY_POLL_MAX_INTERVAL_MS", 5000)?,
            ),
            multiplier,
            max_wait: Duration::from_secs(env.parse_optional("RELAY_POLL_MAX_WAIT_SECS", 300)?),
        };
        if poll.initial_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_POLL_INITIAL_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if poll.max_interval < poll.initial_interval {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_POLL_MAX_INTERVAL_MS".to_string(),
                message: format!(
                    "must be at least RELAY_POLL_INITIAL_MS ({}ms), got {}ms",
                    poll.initial_interval.as_millis(),
                    poll.max_interval.as_millis()
                ),
            });
        }

        Ok(Self {
            assistant_id: env.required("OPENAI_ASSISTANT_ID")?,
            context_store,
            poll,
        })
    }
}

// Helper functions

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn parse_optional<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|s| {
                s.parse().map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{e}"),
                })
            })
            .transpose()
            .map(|opt| opt.unwrap_or(default))
    }
}
