//! Gemini REST backend.
//!
//! Talks to the Generative Language API directly over reqwest:
//! `models/{name}:countTokens` and `models/{name}:generateContent`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::llm::provider::{
    BackendFactory, Candidate, Content, GenerateResponse, GenerationBackend, Part,
};

const PROVIDER: &str = "gemini";

/// Per-request timeout for Gemini calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Gemini client bound to one API key.
pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl GeminiBackend {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn endpoint(&self, model: &str, action: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, action)
    }

    async fn post<T: DeserializeOwned>(&self, url: String, input: &str) -> Result<T, LlmError> {
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&GeminiRequest::user_text(input))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(LlmError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after,
            });
        }

        let body = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {}", truncate_for_log(&body)),
            });
        }

        serde_json::from_str(&body).map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn count_tokens(&self, model: &str, input: &str) -> Result<u64, LlmError> {
        let resp: CountTokensResponse = self.post(self.endpoint(model, "countTokens"), input).await?;
        Ok(resp.total_tokens)
    }

    async fn generate(&self, model: &str, input: &str) -> Result<GenerateResponse, LlmError> {
        let resp: GenerateContentResponse =
            self.post(self.endpoint(model, "generateContent"), input).await?;
        Ok(resp.into())
    }
}

/// Builds [`GeminiBackend`]s sharing one HTTP connection pool.
pub struct GeminiFactory {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiFactory {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

impl BackendFactory for GeminiFactory {
    fn create(&self, api_key: &SecretString) -> Result<Arc<dyn GenerationBackend>, LlmError> {
        tracing::info!(base_url = %self.base_url, "Creating Gemini backend");
        Ok(Arc::new(GeminiBackend::new(
            self.http.clone(),
            self.base_url.clone(),
            api_key.clone(),
        )))
    }
}

// ── Wire format ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GeminiRequest<'a> {
    fn user_text(text: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text }],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    content: Option<WireContent>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

impl From<GenerateContentResponse> for GenerateResponse {
    fn from(resp: GenerateContentResponse) -> Self {
        GenerateResponse {
            candidates: resp
                .candidates
                .into_iter()
                .map(|c| Candidate {
                    content: c.content.map(|content| Content {
                        parts: content
                            .parts
                            .into_iter()
                            .map(|p| Part {
                                text: p.text.unwrap_or_default(),
                            })
                            .collect(),
                    }),
                })
                .collect(),
            usage_total: resp.usage_metadata.and_then(|u| u.total_token_count),
        }
    }
}

/// Retry-After in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn truncate_for_log(body: &str) -> String {
    const MAX: usize = 512;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}…")
    }
}
