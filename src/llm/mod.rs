//! LLM integration for inbox-todo.
//!
//! Supports:
//! - **Gemini**: direct REST access via reqwest
//!
//! The `Summarizer` walks the `ModelCatalog` fallback order, gating every
//! call on the shared `UsageTracker`. Backends sit behind the
//! `GenerationBackend` trait so tests can swap in stubs.

pub mod catalog;
pub mod gemini;
pub mod provider;
pub mod summarizer;
pub mod usage;

pub use catalog::{DEFAULT_MAX_INPUT_TOKENS, ModelCatalog, ModelDescriptor, ModelFamily, ModelId};
pub use gemini::{GeminiBackend, GeminiFactory};
pub use provider::{BackendFactory, Candidate, Content, GenerateResponse, GenerationBackend, Part};
pub use summarizer::{Summarizer, Summary, SummaryRequest};
pub use usage::{Clock, UsageRecord, UsageTracker};

use std::sync::Arc;

use crate::config::SummarizerConfig;
use crate::error::LlmError;

/// Create a Gemini-backed summarizer with a fresh usage ledger.
pub fn create_summarizer(config: &SummarizerConfig) -> Result<Summarizer, LlmError> {
    let tracker = Arc::new(UsageTracker::new(config.usage_window, config.usage_limit));
    let factory = Arc::new(GeminiFactory::new(config.gemini_base_url.clone())?);

    if config.api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; summaries will fail");
    }
    tracing::info!(
        window_secs = config.usage_window.as_secs(),
        limit = config.usage_limit,
        "Token budget configured"
    );

    Ok(Summarizer::new(config, ModelCatalog::gemini(), tracker, factory))
}
