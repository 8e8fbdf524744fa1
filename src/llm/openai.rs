//! OpenAI-compatible LLM client.
//!
//! Speaks the `/v1/chat/completions` wire format with Bearer token auth.
//! An empty `choices` array in a 2xx response is an explicit error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::llm::{ChatMessage, LlmClient, LlmResult, ResponseFormat};
use crate::types::{AppError, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    message: ApiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: String,
}

/// LLM client for OpenAI-compatible APIs.
pub struct ApiLlmClient {
    url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl ApiLlmClient {
    pub fn new(url: &str, model: &str, api_key: &str, timeout: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(timeout),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.url));
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        builder
    }
}

#[async_trait]
impl LlmClient for ApiLlmClient {
    fn name(&self) -> &'static str {
        "api"
    }

    fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.model.is_empty()
    }

    async fn test_connection(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        let probe = self
            .request()
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": "Hi"}],
                "max_tokens": 1,
            }))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match probe {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "api llm connection test failed");
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
                "API LLM client not configured (LLM_URL / LLM_MODEL)".to_string(),
            ));
        }

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
        });
        if response_format == Some(ResponseFormat::Json) {
            payload["response_format"] = json!({ "type": "json_object" });
        }
        if let Some(limit) = max_tokens {
            payload["max_tokens"] = json!(limit);
        }

        let response = self
            .request()
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::LLM(format!("chat request: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::LLM(format!("chat API: {}", e)))?;

        let data: ApiChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("unexpected chat response: {}", e)))?;

        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLM("chat response contained no choices".to_string()))?;

        Ok(LlmResult {
            content: choice.message.content,
            model: data.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_configured() {
        assert!(ApiLlmClient::new("http://host", "gpt-4o-mini", "key", 120).is_configured());
        assert!(!ApiLlmClient::new("http://host", "", "key", 120).is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_chat_errors() {
        let client = ApiLlmClient::new("", "", "", 120);
        let err = client
            .chat(&[ChatMessage::user("hi")], Some(ResponseFormat::Json), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
