//! Error types for inbox-todo.

use std::time::Duration;

use crate::services::HealthOutcome;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// A prospective consumption that would push the sliding-window usage past its ceiling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("token limit exceeded: {current} used + {requested} requested > {limit} allowed")]
pub struct UsageLimitExceeded {
    pub current: u64,
    pub requested: u64,
    pub limit: u64,
}

/// LLM provider and orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Missing API key for provider {provider}")]
    MissingCredential { provider: String },

    #[error("Unsupported model family: {family}")]
    UnsupportedFamily { family: String },

    #[error("Unsupported model: {model}")]
    UnsupportedModel { model: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Context length exceeded: {used} tokens used, {limit} allowed")]
    ContextLengthExceeded { used: u64, limit: u64 },

    #[error("No content generated")]
    NoContent,

    #[error("No content parts generated")]
    NoContentParts,

    #[error(transparent)]
    BudgetExceeded(#[from] UsageLimitExceeded),

    #[error("Failed to generate summary with all models: {}", .models.join(", "))]
    AllModelsFailed { models: Vec<String> },

    #[error("Request cancelled")]
    Cancelled,
}

impl LlmError {
    /// Errors that no other model can fix. These end a summarize call instead
    /// of advancing to the next candidate.
    ///
    /// A budget breach is not fatal: each model counts and truncates its own
    /// input, so a later candidate may still fit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LlmError::MissingCredential { .. }
                | LlmError::UnsupportedFamily { .. }
                | LlmError::UnsupportedModel { .. }
                | LlmError::Cancelled
        )
    }
}

/// Errors from dependent-service connections.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to connect to {name} server at {addr}: {reason}")]
    ConnectFailed {
        name: String,
        addr: String,
        reason: String,
    },

    #[error("Service {name} is not configured")]
    NotConfigured { name: String },

    #[error("Connection to {name} is closed")]
    Closed { name: String },

    #[error("Call {method} on {name} failed: {reason}")]
    CallFailed {
        name: String,
        method: String,
        reason: String,
    },

    #[error("Health probe for {name} failed: {reason}")]
    ProbeFailed { name: String, reason: String },

    #[error("Health check failed: {}", describe_failures(.failures))]
    Unhealthy { failures: Vec<HealthOutcome> },
}

fn describe_failures(failures: &[HealthOutcome]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_error_carries_context() {
        let err: LlmError = UsageLimitExceeded {
            current: 800,
            requested: 300,
            limit: 1000,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("800"));
        assert!(msg.contains("300"));
        assert!(msg.contains("1000"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn transient_errors_are_not_fatal() {
        let err = LlmError::RequestFailed {
            provider: "gemini".into(),
            reason: "model overloaded".into(),
        };
        assert!(!err.is_fatal());
        assert!(!LlmError::NoContent.is_fatal());
        assert!(
            !LlmError::ContextLengthExceeded {
                used: 10,
                limit: 5
            }
            .is_fatal()
        );
    }

    #[test]
    fn all_models_failed_names_attempted_set() {
        let err = LlmError::AllModelsFailed {
            models: vec!["gemini-2.5-flash-lite".into(), "gemini-2.5-flash".into()],
        };
        assert_eq!(
            err.to_string(),
            "Failed to generate summary with all models: gemini-2.5-flash-lite, gemini-2.5-flash"
        );
    }
}
