//! Generation backend capability.
//!
//! The summarizer only talks to these traits; the Gemini client is one
//! implementation, tests plug in stubs.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::LlmError;

/// One text fragment of a generated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub text: String,
}

/// Generated message content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Content {
    pub parts: Vec<Part>,
}

/// One candidate answer. `content` is absent when the provider filtered it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidate {
    pub content: Option<Content>,
}

/// Response of a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
    /// Provider-reported total tokens for the exchange, when available.
    pub usage_total: Option<u64>,
}

impl GenerateResponse {
    /// Single-candidate, single-part response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: vec![Part { text: text.into() }],
                }),
            }],
            usage_total: None,
        }
    }

    pub fn with_usage(mut self, total: u64) -> Self {
        self.usage_total = Some(total);
        self
    }

    /// Text of the first part of the first candidate.
    pub fn first_text(&self) -> Result<&str, LlmError> {
        let content = self
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .ok_or(LlmError::NoContent)?;
        content
            .parts
            .first()
            .map(|p| p.text.as_str())
            .ok_or(LlmError::NoContentParts)
    }
}

/// Token counting and text generation against a provider.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Provider label used in errors and logs.
    fn provider(&self) -> &str;

    /// Size of `input` in the provider's cost units.
    async fn count_tokens(&self, model: &str, input: &str) -> Result<u64, LlmError>;

    /// Generate a response for `input`.
    async fn generate(&self, model: &str, input: &str) -> Result<GenerateResponse, LlmError>;
}

/// Creates a backend handle for a credential.
pub trait BackendFactory: Send + Sync {
    fn create(&self, api_key: &SecretString) -> Result<Arc<dyn GenerationBackend>, LlmError>;
}
