//! Model identifiers, provider names and fallback order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Input ceiling applied when neither the request nor the model says otherwise.
pub const DEFAULT_MAX_INPUT_TOKENS: u32 = 1_048_576;

/// A grouping of models sharing one provider API shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Gemini,
    OpenAi,
}

impl ModelFamily {
    /// Lowercase family name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Gemini => "gemini",
            ModelFamily::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(ModelFamily::Gemini),
            "openai" => Ok(ModelFamily::OpenAi),
            other => Err(format!("unknown model family: {other}")),
        }
    }
}

/// Abstract model identifier, independent of the provider's naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "gemini-2.0-flash")]
    Gemini20Flash,
    #[serde(rename = "gemini-2.0-flash-lite")]
    Gemini20FlashLite,
    #[serde(rename = "gemini-2.5-pro")]
    Gemini25Pro,
    #[serde(rename = "gemini-2.5-flash")]
    Gemini25Flash,
    #[serde(rename = "gemini-2.5-flash-lite")]
    Gemini25FlashLite,
    #[serde(rename = "gemini-3-flash")]
    Gemini3Flash,
}

impl ModelId {
    pub const ALL: [ModelId; 6] = [
        ModelId::Gemini20Flash,
        ModelId::Gemini20FlashLite,
        ModelId::Gemini25Pro,
        ModelId::Gemini25Flash,
        ModelId::Gemini25FlashLite,
        ModelId::Gemini3Flash,
    ];

    /// Abstract model id used in requests and responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gemini20Flash => "gemini-2.0-flash",
            ModelId::Gemini20FlashLite => "gemini-2.0-flash-lite",
            ModelId::Gemini25Pro => "gemini-2.5-pro",
            ModelId::Gemini25Flash => "gemini-2.5-flash",
            ModelId::Gemini25FlashLite => "gemini-2.5-flash-lite",
            ModelId::Gemini3Flash => "gemini-3-flash",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown model: {s}"))
    }
}

/// What the catalog knows about one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: ModelId,
    /// Name the provider API expects.
    pub provider_name: String,
    /// Hard ceiling on input tokens for a single request.
    pub max_input_tokens: u32,
}

impl ModelDescriptor {
    /// Describe a model with the default input ceiling.
    pub fn new(id: ModelId, provider_name: impl Into<String>) -> Self {
        Self {
            id,
            provider_name: provider_name.into(),
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
        }
    }

    /// Override the hard input ceiling for this model.
    pub fn with_max_input_tokens(mut self, max_input_tokens: u32) -> Self {
        self.max_input_tokens = max_input_tokens;
        self
    }
}

/// Read-only model table plus the order in which models are tried.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<ModelId, ModelDescriptor>,
    priority: Vec<ModelId>,
    families: Vec<ModelFamily>,
}

impl ModelCatalog {
    /// Build a catalog. Every entry in `priority` must be described and
    /// appear only once.
    pub fn new(
        families: Vec<ModelFamily>,
        models: Vec<ModelDescriptor>,
        priority: Vec<ModelId>,
    ) -> Result<Self, ConfigError> {
        let models: HashMap<ModelId, ModelDescriptor> =
            models.into_iter().map(|d| (d.id, d)).collect();

        for (i, id) in priority.iter().enumerate() {
            if !models.contains_key(id) {
                return Err(ConfigError::InvalidValue {
                    key: "model priority".to_string(),
                    message: format!("{id} has no provider mapping"),
                });
            }
            if priority[..i].contains(id) {
                return Err(ConfigError::InvalidValue {
                    key: "model priority".to_string(),
                    message: format!("{id} listed more than once"),
                });
            }
        }

        Ok(Self {
            models,
            priority,
            families,
        })
    }

    /// The Gemini catalog: cheapest models first, `gemini-2.5-pro` only on request.
    pub fn gemini() -> Self {
        Self {
            models: [
                ModelDescriptor::new(ModelId::Gemini25Pro, "gemini-2.5-pro"),
                ModelDescriptor::new(ModelId::Gemini25Flash, "gemini-2.5-flash"),
                ModelDescriptor::new(ModelId::Gemini25FlashLite, "gemini-2.5-flash-lite"),
                ModelDescriptor::new(ModelId::Gemini3Flash, "gemini-3-flash-preview"),
            ]
            .into_iter()
            .map(|d| (d.id, d))
            .collect(),
            priority: vec![
                ModelId::Gemini25FlashLite,
                ModelId::Gemini25Flash,
                ModelId::Gemini3Flash,
            ],
            families: vec![ModelFamily::Gemini],
        }
    }

    /// Provider-specific name for `id`, if it is mapped.
    pub fn name_for(&self, id: ModelId) -> Option<&str> {
        self.models.get(&id).map(|d| d.provider_name.as_str())
    }

    /// Full descriptor for `id`, if it is mapped.
    pub fn descriptor(&self, id: ModelId) -> Option<&ModelDescriptor> {
        self.models.get(&id)
    }

    /// Fallback order, most preferred first.
    pub fn preference_order(&self) -> &[ModelId] {
        &self.priority
    }

    /// Whether requests for `family` can be served.
    pub fn is_family_supported(&self, family: ModelFamily) -> bool {
        self.families.contains(&family)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::gemini()
    }
}
