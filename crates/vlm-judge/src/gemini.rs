//! Gemini (cloud) judge provider
//!
//! Calls the Generative Language REST API. The credential travels with each
//! request's [`VlmConfig`], so one provider instance serves every project.

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

/// Public Generative Language API endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const IMAGE_MIME_TYPE: &str = "image/png";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
    response_json_schema: Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

impl GenerateContentResponse {
    /// Answer text of the first candidate, thought parts excluded.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts
            .iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Cloud judge provider backed by Google Gemini
pub struct GeminiProvider {
    base_url: String,
    http: OnceCell<reqwest::Client>,
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self::with_base_url(GEMINI_BASE_URL)
    }

    /// Provider pointed at a different API host (proxies, tests).
    pub fn with_base_url(base_url: &str) -> Self {
        GeminiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: OnceCell::new(),
        }
    }

    async fn http(&self) -> Result<&reqwest::Client> {
        self.http
            .get_or_try_init(|| async {
                debug!(base_url = %self.base_url, "creating Gemini client");
                reqwest::Client::builder()
                    .user_agent(concat!("vlm-judge/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .map_err(VlmError::from)
            })
            .await
    }
}

fn generate_request<'a>(config: &'a VlmConfig, images: &[Vec<u8>]) -> GenerateContentRequest<'a> {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(Part::Text {
        text: &config.prompt,
    });
    parts.extend(images.iter().map(|img| Part::InlineData {
        inline_data: InlineData {
            mime_type: IMAGE_MIME_TYPE,
            data: BASE64.encode(img),
        },
    }));

    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfig {
            temperature: config.temperature,
            response_mime_type: "application/json",
            response_json_schema: verdict_json_schema(),
        },
    }
}

/// `generateContent` endpoint for `model`, with the model name escaped as a
/// single path segment.
fn generate_url(base_url: &str, model: &str) -> Result<reqwest::Url> {
    let mut url =
        reqwest::Url::parse(base_url).map_err(|e| VlmError::Http(format!("{base_url}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| VlmError::Http(format!("{base_url}: not a base URL")))?
        .pop_if_empty()
        .extend(["v1beta", "models", &format!("{model}:generateContent")]);
    Ok(url)
}

#[async_trait]
impl VlmProvider for GeminiProvider {
    async fn generate(
        &self,
        config: &VlmConfig,
        images: &[Vec<u8>],
    ) -> Result<VlmProviderResponse> {
        if config.provider != ProviderKind::Gemini {
            return Err(VlmError::ProviderMismatch {
                expected: ProviderKind::Gemini,
                actual: config.provider,
            });
        }

        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(VlmError::MissingApiKey)?;

        let http = self.http().await?;
        let url = generate_url(&self.base_url, &config.model)?;
        let body = generate_request(config, images);

        debug!(model = %config.model, images = images.len(), "sending Gemini generateContent request");
        let response = http
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "gemini", error = %e, "generate request failed");
                VlmError::from(e)
            })?;
        let response = ensure_success(ProviderKind::Gemini, response).await?;
        let parsed: GenerateContentResponse = response.json().await?;

        Ok(VlmProviderResponse {
            content: parsed.text(),
            thinking: None,
        })
    }
}
