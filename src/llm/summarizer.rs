//! Summarizer: tries models in order until one produces a summary.
//!
//! Flow per request:
//! 1. Validate the family and resolve the input ceiling
//! 2. Walk the candidate list (the requested model, or the catalog order)
//! 3. Per model: count tokens, shrink oversized input, check the usage
//!    budget, generate, record usage
//!
//! Configuration problems (missing key, unknown model, unsupported family)
//! end the request at once. Provider failures and budget breaches move on
//! to the next model after a short backoff.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SummarizerConfig;
use crate::error::LlmError;
use crate::llm::catalog::{ModelCatalog, ModelDescriptor, ModelFamily, ModelId};
use crate::llm::provider::{BackendFactory, GenerationBackend};
use crate::llm::usage::UsageTracker;

/// A summarization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub family: ModelFamily,
    pub prompt: String,
    pub text: String,
    /// Pin a single model instead of walking the fallback order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelId>,
    /// Input ceiling for this request. `None` or zero uses the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<u32>,
}

impl SummaryRequest {
    /// Create a request that walks the full fallback order.
    pub fn new(family: ModelFamily, prompt: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            family,
            prompt: prompt.into(),
            text: text.into(),
            model: None,
            max_input_tokens: None,
        }
    }

    /// Pin the request to a single model.
    pub fn with_model(mut self, model: ModelId) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the input ceiling for this request.
    pub fn with_max_input_tokens(mut self, max_input_tokens: u32) -> Self {
        self.max_input_tokens = Some(max_input_tokens);
        self
    }
}

/// A generated summary and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub model: ModelId,
}

/// Model-fallback orchestrator with a shared token budget.
pub struct Summarizer {
    api_key: Option<SecretString>,
    default_max_input_tokens: u32,
    retry_backoff: Duration,
    catalog: ModelCatalog,
    tracker: Arc<UsageTracker>,
    factory: Arc<dyn BackendFactory>,
    /// Backend built from the credential on first use.
    backend: Mutex<Option<Arc<dyn GenerationBackend>>>,
}

impl Summarizer {
    pub fn new(
        config: &SummarizerConfig,
        catalog: ModelCatalog,
        tracker: Arc<UsageTracker>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        Self {
            api_key: config.api_key.clone(),
            default_max_input_tokens: config.default_max_input_tokens,
            retry_backoff: config.retry_backoff,
            catalog,
            tracker,
            factory,
            backend: Mutex::new(None),
        }
    }

    /// Shared usage ledger.
    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.tracker
    }

    /// Model catalog this summarizer walks.
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Summarize `request.text`, falling back through models on failure.
    ///
    /// Cancelling `cancel` abandons the in-flight backend call and skips any
    /// pending backoff.
    pub async fn summarize(
        &self,
        request: &SummaryRequest,
        cancel: &CancellationToken,
    ) -> Result<Summary, LlmError> {
        if !self.catalog.is_family_supported(request.family) {
            return Err(LlmError::UnsupportedFamily {
                family: request.family.to_string(),
            });
        }

        let max_input_tokens = request
            .max_input_tokens
            .filter(|n| *n != 0)
            .unwrap_or(self.default_max_input_tokens);

        let candidates: Vec<ModelId> = match request.model {
            Some(model) => vec![model],
            None => self.catalog.preference_order().to_vec(),
        };

        for (i, model) in candidates.iter().copied().enumerate() {
            let Some(descriptor) = self.catalog.descriptor(model) else {
                return Err(LlmError::UnsupportedModel {
                    model: model.to_string(),
                });
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                result = self.attempt(request, descriptor, max_input_tokens) => result,
            };

            match outcome {
                Ok(summary) if !summary.is_empty() => {
                    info!(model = %model, "Successfully generated summary");
                    return Ok(Summary { summary, model });
                }
                Ok(_) => warn!(model = %model, "Model returned an empty summary"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(LlmError::BudgetExceeded(exceeded)) => warn!(
                    model = %model,
                    current = exceeded.current,
                    requested = exceeded.requested,
                    limit = exceeded.limit,
                    "Token budget would be exceeded, trying next model"
                ),
                Err(e) => warn!(model = %model, error = %e, "Error generating summary"),
            }

            if i + 1 < candidates.len() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                    _ = tokio::time::sleep(self.retry_backoff) => {}
                }
            }
        }

        let models: Vec<String> = candidates.iter().map(|m| m.to_string()).collect();
        error!(models = ?models, "Failed to generate summary with all models");
        Err(LlmError::AllModelsFailed { models })
    }

    /// One generation attempt against a single model.
    async fn attempt(
        &self,
        request: &SummaryRequest,
        descriptor: &ModelDescriptor,
        max_input_tokens: u32,
    ) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| LlmError::MissingCredential {
                provider: request.family.to_string(),
            })?;

        let backend = self.backend(api_key)?;
        let model = descriptor.provider_name.as_str();
        let limit = u64::from(max_input_tokens.min(descriptor.max_input_tokens));

        let mut input = format!("{}\n{}", request.prompt, request.text);
        let mut tokens = backend.count_tokens(model, &input).await?;

        while tokens > limit {
            if input.is_empty() {
                return Err(LlmError::ContextLengthExceeded {
                    used: tokens,
                    limit,
                });
            }
            shrink(&mut input);
            debug!(
                provider = backend.provider(),
                model,
                tokens,
                limit,
                chars = input.len(),
                "Input over ceiling, truncated"
            );
            tokens = backend.count_tokens(model, &input).await?;
        }

        self.tracker.check_limit(tokens)?;

        let response = backend.generate(model, &input).await?;
        let summary = response.first_text()?.to_string();

        let used = response.usage_total.unwrap_or(tokens);
        self.tracker.record(used);
        debug!(
            provider = backend.provider(),
            model,
            used,
            total = self.tracker.current_usage(),
            "Recorded token usage"
        );

        Ok(summary)
    }

    fn backend(&self, api_key: &SecretString) -> Result<Arc<dyn GenerationBackend>, LlmError> {
        let mut slot = self.backend.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(backend) = slot.as_ref() {
            return Ok(Arc::clone(backend));
        }
        let backend = self.factory.create(api_key)?;
        *slot = Some(Arc::clone(&backend));
        Ok(backend)
    }
}

/// Keep the first 90% of the characters (floor). Always shortens non-empty text.
fn shrink(input: &mut String) {
    let keep = input.chars().count() / 10 * 9;
    let cut = input
        .char_indices()
        .nth(keep)
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    input.truncate(cut);
}
