//! Provider capability and dispatch.
//!
//! Every backend implements [`VlmProvider`]. The verifier never talks to a
//! backend directly: it hands the config to [`ProviderRegistry::generate`],
//! which routes on [`VlmConfig::provider`]. A new backend is a new
//! [`ProviderKind`] variant plus a registration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderKind, VlmConfig};
use crate::error::VlmError;
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::Result;

/// Raw answer from a judge backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlmProviderResponse {
    /// Primary answer text
    pub content: Option<String>,
    /// Reasoning trace (some models put the answer here instead)
    pub thinking: Option<String>,
}

impl VlmProviderResponse {
    pub fn content(text: &str) -> Self {
        VlmProviderResponse {
            content: Some(text.to_string()),
            thinking: None,
        }
    }

    /// Pick the text to decode.
    ///
    /// `use_thinking` selects which field is preferred; the other field is
    /// used when the preferred one is absent or blank. `None` when both are.
    pub fn text(&self, use_thinking: bool) -> Option<&str> {
        let (preferred, fallback) = if use_thinking {
            (&self.thinking, &self.content)
        } else {
            (&self.content, &self.thinking)
        };
        non_blank(preferred).or_else(|| non_blank(fallback))
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

/// A vision-capable judge backend.
///
/// Implementations propagate transport and API errors unchanged; degrading
/// to the pixel verdict is the caller's business.
#[async_trait]
pub trait VlmProvider: Send + Sync {
    /// Send `config.prompt` plus `images` (encoded PNG buffers, in order).
    async fn generate(&self, config: &VlmConfig, images: &[Vec<u8>])
        -> Result<VlmProviderResponse>;
}

/// Routes requests to the provider named in the config.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn VlmProvider>>,
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in providers, configured from the environment.
    ///
    /// Nothing is validated here; a missing `OLLAMA_BASE_URL` only surfaces
    /// when the Ollama provider is first used.
    pub fn from_env() -> Self {
        Self::new()
            .with_provider(ProviderKind::Ollama, Arc::new(OllamaProvider::from_env()))
            .with_provider(ProviderKind::Gemini, Arc::new(GeminiProvider::new()))
    }

    /// Register (or replace) the provider for `kind`.
    pub fn with_provider(mut self, kind: ProviderKind, provider: Arc<dyn VlmProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn VlmProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Dispatch to the provider selected by `config.provider`.
    pub async fn generate(
        &self,
        config: &VlmConfig,
        images: &[Vec<u8>],
    ) -> Result<VlmProviderResponse> {
        let provider = self
            .providers
            .get(&config.provider)
            .ok_or(VlmError::ProviderNotRegistered(config.provider))?;
        provider.generate(config, images).await
    }
}

/// Turn a non-2xx response into [`VlmError::Api`], keeping the body text.
pub(crate) async fn ensure_success(
    provider: ProviderKind,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(provider = %provider, status = status.as_u16(), body = %body, "request rejected");
    Err(VlmError::Api {
        provider,
        status: status.as_u16(),
        body,
    })
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.kinds())
            .finish()
    }
}
