//! Ollama (local) judge provider
//!
//! Talks to a locally hosted Ollama service over its REST API. The HTTP
//! client is built on first use and reused for the lifetime of the provider.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::config::{ProviderKind, VlmConfig};
use crate::error::VlmError;
use crate::provider::{ensure_success, VlmProvider, VlmProviderResponse};
use crate::schema::verdict_json_schema;
use crate::Result;

/// Environment variable holding the Ollama endpoint.
pub const OLLAMA_BASE_URL_ENV: &str = "OLLAMA_BASE_URL";

/// A model available on the Ollama backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: Option<ModelDetails>,
}

/// Model metadata reported by `/api/tags`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: Value,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    images: Vec<String>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

/// Local judge provider backed by Ollama
pub struct OllamaProvider {
    base_url: Option<String>,
    client: OnceCell<OllamaClient>,
}

impl OllamaProvider {
    /// Provider bound to an explicit endpoint (`None` fails on first use).
    pub fn new(base_url: Option<String>) -> Self {
        OllamaProvider {
            base_url,
            client: OnceCell::new(),
        }
    }

    /// Provider bound to `OLLAMA_BASE_URL`.
    pub fn from_env() -> Self {
        Self::new(std::env::var(OLLAMA_BASE_URL_ENV).ok())
    }

    /// Whether the HTTP client has been built yet.
    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }

    async fn client(&self) -> Result<&OllamaClient> {
        self.client
            .get_or_try_init(|| async {
                let base_url = self
                    .base_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .ok_or(VlmError::MissingBaseUrl)?;

                debug!(base_url = %base_url, "creating Ollama client");
                let http = reqwest::Client::builder()
                    .user_agent(concat!("vlm-judge/", env!("CARGO_PKG_VERSION")))
                    .build()?;

                Ok::<_, VlmError>(OllamaClient {
                    http,
                    base_url: base_url.trim_end_matches('/').to_string(),
                })
            })
            .await
    }

    /// Enumerate models installed on the backend.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let client = self.client().await?;
        let url = format!("{}/api/tags", client.base_url);

        let response = client.http.get(&url).send().await.map_err(|e| {
            error!(provider = "ollama", error = %e, "failed to list models");
            VlmError::from(e)
        })?;
        let response = ensure_success(ProviderKind::Ollama, response).await?;
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models)
    }
}

fn chat_request<'a>(config: &'a VlmConfig, images: &[Vec<u8>]) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        messages: vec![ChatMessage {
            role: "user",
            content: &config.prompt,
            images: images.iter().map(|img| BASE64.encode(img)).collect(),
        }],
        stream: false,
        format: verdict_json_schema(),
        options: ChatOptions {
            temperature: config.temperature,
        },
    }
}

#[async_trait]
impl VlmProvider for OllamaProvider {
    async fn generate(
        &self,
        config: &VlmConfig,
        images: &[Vec<u8>],
    ) -> Result<VlmProviderResponse> {
        if config.provider != ProviderKind::Ollama {
            return Err(VlmError::ProviderMismatch {
                expected: ProviderKind::Ollama,
                actual: config.provider,
            });
        }

        let client = self.client().await?;
        let url = format!("{}/api/chat", client.base_url);
        let body = chat_request(config, images);

        debug!(model = %config.model, images = images.len(), "sending Ollama chat request");
        let response = client.http.post(&url).json(&body).send().await.map_err(|e| {
            error!(provider = "ollama", error = %e, "generate request failed");
            VlmError::from(e)
        })?;
        let response = ensure_success(ProviderKind::Ollama, response).await?;
        let chat: ChatResponse = response.json().await?;

        Ok(VlmProviderResponse {
            content: chat.message.content,
            thinking: chat.message.thinking,
        })
    }
}
