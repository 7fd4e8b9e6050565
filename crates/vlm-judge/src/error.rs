//! Error types for vlm-judge

use thiserror::Error;

use crate::config::ProviderKind;

/// Errors that can occur while consulting a semantic judge
#[derive(Error, Debug)]
pub enum VlmError {
    /// Local provider has no endpoint configured
    #[error("Ollama base URL is not configured (set OLLAMA_BASE_URL)")]
    MissingBaseUrl,

    /// Cloud provider called without a credential
    #[error("Gemini API key is required")]
    MissingApiKey,

    /// Provider received a config addressed to another provider
    #[error("{expected} provider cannot handle a {actual} config")]
    ProviderMismatch {
        expected: ProviderKind,
        actual: ProviderKind,
    },

    /// No provider registered for the requested kind
    #[error("no VLM provider registered for {0}")]
    ProviderNotRegistered(ProviderKind),

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Backend answered with a non-success status
    #[error("{provider} API returned {status}: {body}")]
    Api {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    /// Neither content nor thinking carried any text
    #[error("Empty response from model")]
    EmptyResponse,

    /// Model answer is not JSON at all
    #[error("model response is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Model answer is JSON but not the verdict shape
    #[error("model response does not match verdict schema: {0}")]
    SchemaMismatch(String),
}

impl From<reqwest::Error> for VlmError {
    fn from(err: reqwest::Error) -> Self {
        VlmError::Http(err.to_string())
    }
}
