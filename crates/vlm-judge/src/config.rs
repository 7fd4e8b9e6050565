//! VLM configuration and loose config resolution
//!
//! Project settings arrive as free-form JSON strings that may be empty,
//! malformed, partial or carry stale fields. [`parse_config`] turns such a
//! payload into a fully-populated config by overlaying every recognised,
//! well-typed field onto a defaults value.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Instruction prompt sent alongside baseline, candidate and diff images.
pub const DEFAULT_PROMPT: &str = "You are provided with three images:
1. First image: baseline screenshot
2. Second image: new version screenshot
3. Diff image

Spot any difference in text, color, shape and position of elements - treat as different even slight change.
Ignore minor rendering artifacts that are imperceptible to users like antialiasing.
Describe the difference in about 100 words.";

/// Default local vision model.
pub const DEFAULT_MODEL: &str = "gemma3:12b";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Which semantic judge backend serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Locally hosted Ollama service.
    #[default]
    #[serde(alias = "local")]
    Ollama,
    /// Google Gemini cloud API.
    #[serde(alias = "cloud")]
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic-stage configuration, built fresh for every comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VlmConfig {
    /// Backend to consult
    #[serde(default)]
    pub provider: ProviderKind,
    /// Model identifier, e.g. `gemma3:12b` or `gemini-1.5-pro`
    pub model: String,
    /// Instruction prompt
    pub prompt: String,
    /// Response randomness (0.0 - 1.0)
    pub temperature: f32,
    /// Prefer the model's reasoning trace over its answer text
    #[serde(default)]
    pub use_thinking: bool,
    /// Cloud credential (Gemini only)
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for VlmConfig {
    fn default() -> Self {
        VlmConfig {
            provider: ProviderKind::Ollama,
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            use_thinking: false,
            api_key: None,
        }
    }
}

impl VlmConfig {
    /// Config for a Gemini model with the default prompt.
    pub fn gemini(model: &str, api_key: &str) -> Self {
        VlmConfig {
            provider: ProviderKind::Gemini,
            model: model.to_string(),
            api_key: Some(api_key.to_string()),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_thinking(mut self, use_thinking: bool) -> Self {
        self.use_thinking = use_thinking;
        self
    }
}

/// Resolve a raw JSON config string against `defaults`.
///
/// Never fails: blank input, invalid JSON and non-object JSON all yield
/// `defaults`. For an object, each key that names a field of `T` replaces the
/// default only if the resulting value still deserializes; anything else is
/// dropped. No cross-field validation happens here.
pub fn parse_config<T>(raw: &str, defaults: &T) -> T
where
    T: Serialize + DeserializeOwned + Clone,
{
    if raw.trim().is_empty() {
        return defaults.clone();
    }

    let fields = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            warn!(kind = json_kind(&other), "config is not a JSON object, using defaults");
            return defaults.clone();
        }
        Err(e) => {
            warn!(error = %e, "invalid config JSON, using defaults");
            return defaults.clone();
        }
    };

    let mut merged = match serde_json::to_value(defaults) {
        Ok(Value::Object(map)) => map,
        _ => return defaults.clone(),
    };

    for (key, value) in fields {
        if !merged.contains_key(&key) {
            debug!(field = %key, "ignoring unrecognized config field");
            continue;
        }
        let previous = merged.insert(key.clone(), value);
        if decode::<T>(&merged).is_none() {
            warn!(field = %key, "ignoring ill-typed config field");
            if let Some(previous) = previous {
                merged.insert(key, previous);
            }
        }
    }

    decode(&merged).unwrap_or_else(|| defaults.clone())
}

fn decode<T: DeserializeOwned>(fields: &Map<String, Value>) -> Option<T> {
    serde_json::from_value(Value::Object(fields.clone())).ok()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
