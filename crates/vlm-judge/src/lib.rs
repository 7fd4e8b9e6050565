//! VLM-Judge: Semantic judges for visual regression verification
//!
//! This crate lets the VRT verifier ask a vision-language model whether a
//! borderline pixel diff is a real regression. It knows nothing about
//! images beyond "ordered PNG buffers" and nothing about test status; it only
//! sends a prompt plus images and decodes a strict verdict.
//!
//! ## Providers
//!
//! - [`OllamaProvider`]: locally hosted models (`OLLAMA_BASE_URL`)
//! - [`GeminiProvider`]: Google Gemini, credential per request
//!
//! Both sit behind [`VlmProvider`] and are selected at runtime through
//! [`ProviderRegistry`].

pub mod config;
pub mod error;
pub mod gemini;
pub mod ollama;
pub mod provider;
pub mod schema;

pub use config::{
    parse_config, ProviderKind, VlmConfig, DEFAULT_MODEL, DEFAULT_PROMPT, DEFAULT_TEMPERATURE,
};
pub use error::VlmError;
pub use gemini::{GeminiProvider, GEMINI_BASE_URL};
pub use ollama::{ModelDetails, ModelInfo, OllamaProvider, OLLAMA_BASE_URL_ENV};
pub use provider::{ProviderRegistry, VlmProvider, VlmProviderResponse};
pub use schema::{decode_verdict, verdict_json_schema, VlmVerdict};

/// Result type for judge operations
pub type Result<T> = std::result::Result<T, VlmError>;
