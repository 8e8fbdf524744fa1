//! Ollama LLM client.
//!
//! Speaks Ollama's native chat API: `POST {url}/api/chat` with
//! `{"model", "messages", "stream": false}`, `"format": "json"` for JSON
//! output, and `options.num_predict` for a token cap. Liveness is
//! `GET {url}/api/tags`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::llm::{ChatMessage, LlmClient, LlmResult, ResponseFormat};
use crate::types::{AppError, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaChatMessage>,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatMessage {
    #[serde(default)]
    content: String,
}

/// LLM client for Ollama's native API.
pub struct OllamaLlmClient {
    url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaLlmClient {
    pub fn new(url: &str, model: &str, timeout: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OllamaLlmClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.model.is_empty()
    }

    async fn test_connection(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        match self
            .client
            .get(format!("{}/api/tags", self.url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "ollama connection test failed");
                false
            }
        }
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        response_format: Option<ResponseFormat>,
        max_tokens: Option<u32>,
    ) -> Result<LlmResult> {
        if !self.is_configured() {
            return Err(AppError::Configuration(
                "Ollama LLM client not configured (LLM_URL / LLM_MODEL)".to_string(),
            ));
        }

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if response_format == Some(ResponseFormat::Json) {
            payload["format"] = json!("json");
        }
        if let Some(limit) = max_tokens {
            payload["options"] = json!({ "num_predict": limit });
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::LLM(format!("ollama chat request: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::LLM(format!("ollama chat: {}", e)))?;

        let data: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("unexpected ollama chat response: {}", e)))?;

        Ok(LlmResult {
            content: data.message.map(|m| m.content).unwrap_or_default(),
            model: data.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: data.done_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}
