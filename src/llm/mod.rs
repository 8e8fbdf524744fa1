//! LLM client abstractions for document enrichment.
//!
//! This module provides a unified chat interface over two provider flavors:
//! - **Ollama**: native `/api/chat` API for local inference
//! - **OpenAI-compatible**: `/v1/chat/completions` with Bearer auth
//!
//! The pipeline only needs non-streaming chat with an optional JSON
//! response format, used by the tier-1/tier-2 enrichment service.

mod ollama;
mod openai;

pub use ollama::OllamaLlmClient;
pub use openai::ApiLlmClient;

use async_trait::async_trait;

use crate::types::{AppError, Result};

/// A single chat message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response format hint for a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Ask the model for a JSON object.
    Json,
}

/// Result from an LLM chat request.
#[derive(Debug, Clone)]
pub struct LlmResult {
    pub content: String,
    pub model: String,
    pub finish_reason: String,
}

/// Generic LLM client trait for provider abstraction.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Whether URL and model are configured.
    fn is_configured(&self) -> bool;

    /// Probe connectivity to the LLM service.
    async fn test_connection(&self) -> bool;

    /// Send a non-streaming chat completion request.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        response_format: Option<ResponseFormat>,
        max_tokens: Option<u32>,
    ) -> Result<LlmResult>;
}

impl std::fmt::Debug for dyn LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient").field("name", &self.name()).finish()
    }
}

/// Create an LLM client for the configured backend name.
pub fn create_llm_client(
    backend: &str,
    model: &str,
    url: &str,
    api_key: &str,
    timeout: u64,
) -> Result<Box<dyn LlmClient>> {
    match backend {
        "ollama" => Ok(Box::new(OllamaLlmClient::new(url, model, timeout))),
        "openai" | "api" => Ok(Box::new(ApiLlmClient::new(url, model, api_key, timeout))),
        _ => Err(AppError::Configuration(format!(
            "Unknown LLM backend: {}",
            backend
        ))),
    }
}
