//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_MAX_INPUT_TOKENS, ModelId};

/// Default base URL of the Gemini REST API.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Summarizer configuration.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Gemini API key. Summaries fail fast when absent.
    pub api_key: Option<SecretString>,
    /// Input ceiling used when a request does not carry its own.
    pub default_max_input_tokens: u32,
    /// Length of the sliding usage window.
    pub usage_window: Duration,
    /// Token ceiling within the window. Zero or negative disables enforcement.
    pub usage_limit: i64,
    /// Pause between failed model attempts.
    pub retry_backoff: Duration,
    /// Gemini REST endpoint.
    pub gemini_base_url: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            usage_window: Duration::from_secs(24 * 3600), // 1 day
            usage_limit: 3_000_000,
            retry_backoff: Duration::from_secs(1),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }
}

impl SummarizerConfig {
    /// Load from `GEMINI_API_KEY` and `INBOX_TODO_*` variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        Ok(Self {
            api_key,
            default_max_input_tokens: env_or("INBOX_TODO_MAX_INPUT_TOKENS", defaults.default_max_input_tokens)?,
            usage_window: Duration::from_secs(env_or(
                "INBOX_TODO_USAGE_WINDOW_SECS",
                defaults.usage_window.as_secs(),
            )?),
            usage_limit: env_or("INBOX_TODO_DAILY_TOKEN_LIMIT", defaults.usage_limit)?,
            retry_backoff: Duration::from_millis(env_or(
                "INBOX_TODO_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )?),
            gemini_base_url: std::env::var("INBOX_TODO_GEMINI_BASE_URL")
                .unwrap_or(defaults.gemini_base_url),
        })
    }
}

/// Address of one dependent service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub name: String,
    pub addr: String,
}

/// Gateway startup configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub llm_addr: String,
    pub todo_addr: String,
    pub database_addr: String,
    /// Path of the SQLite file the database service should manage.
    pub database_path: String,
    /// Upper bound on waiting for dependencies at startup.
    pub health_check_timeout: Duration,
    /// Interval between health probes of a single dependency.
    pub health_poll_interval: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = std::env::var("INBOX_TODO_DATABASE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("INBOX_TODO_DATABASE_PATH".to_string()))?;

        Ok(Self {
            llm_addr: std::env::var("INBOX_TODO_LLM_ADDR").unwrap_or_else(|_| ":50051".to_string()),
            todo_addr: std::env::var("INBOX_TODO_TODO_ADDR").unwrap_or_else(|_| ":50052".to_string()),
            database_addr: std::env::var("INBOX_TODO_DATABASE_ADDR")
                .unwrap_or_else(|_| ":50053".to_string()),
            database_path,
            health_check_timeout: Duration::from_secs(env_or("INBOX_TODO_HEALTH_CHECK_TIMEOUT_SECS", 10)?),
            health_poll_interval: Duration::from_millis(env_or("INBOX_TODO_HEALTH_POLL_MS", 500)?),
        })
    }

    /// Endpoints in startup order.
    pub fn endpoints(&self) -> Vec<ServiceEndpoint> {
        [
            ("llm", &self.llm_addr),
            ("todo", &self.todo_addr),
            ("database", &self.database_addr),
        ]
        .into_iter()
        .map(|(name, addr)| ServiceEndpoint {
            name: name.to_string(),
            addr: addr.clone(),
        })
        .collect()
    }
}

/// Options for a one-shot summarize run.
#[derive(Debug, Clone)]
pub struct SummarizeCommand {
    pub prompt: String,
    pub model: Option<ModelId>,
    pub max_input_tokens: Option<u32>,
}

/// Prompt used when `INBOX_TODO_PROMPT` is not set.
pub const DEFAULT_SUMMARY_PROMPT: &str = "Summarize the following email as a short, actionable task. \
Lead with what needs to be done, then the deadline and the people involved if any.";

impl SummarizeCommand {
    pub fn from_env() -> Result<Self, ConfigError> {
        let prompt =
            std::env::var("INBOX_TODO_PROMPT").unwrap_or_else(|_| DEFAULT_SUMMARY_PROMPT.to_string());

        let model = match std::env::var("INBOX_TODO_MODEL") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse().map_err(|e: String| ConfigError::InvalidValue {
                    key: "INBOX_TODO_MODEL".to_string(),
                    message: e,
                })?)
            }
            _ => None,
        };

        let max_input_tokens =
            Some(env_or("INBOX_TODO_REQUEST_MAX_TOKENS", 0u32)?).filter(|n| *n != 0);

        Ok(Self {
            prompt,
            model,
            max_input_tokens,
        })
    }
}

/// Parse an optional environment variable, rejecting malformed values rather
/// than silently falling back.
fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
