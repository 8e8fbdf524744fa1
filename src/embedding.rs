//! Embedding clients for generating vectors via HTTP APIs.
//!
//! Two flavors are supported behind one contract:
//! - **Ollama native**: `POST {url}/api/embed` with `{model, input}`
//! - **OpenAI-compatible**: `POST {url}/v1/embeddings` with Bearer auth;
//!   the response is re-sorted by `index` before use
//!
//! Requests are batched internally.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::types::{AppError, Result};

const DEFAULT_BATCH_SIZE: usize = 32;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result from an embedding request.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
    pub dimensions: usize,
}

/// Embedding client contract.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Whether URL and model are configured.
    fn is_configured(&self) -> bool;

    /// Probe connectivity to the embedding service.
    async fn test_connection(&self) -> bool;

    /// Embed a list of texts, batching internally. Returns one vector per
    /// input in input order.
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let result = self.embed(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::External("embedding service returned no results".to_string()))
    }
}

impl std::fmt::Debug for dyn EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient").field("name", &self.name()).finish()
    }
}

// ============================================================================
// Ollama Native Client
// ============================================================================

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding client for Ollama's native API.
pub struct OllamaEmbeddingClient {
    url: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
    batch_size: usize,
    client: reqwest::Client,
}

impl OllamaEmbeddingClient {
    pub fn new(url: &str, model: &str, dimensions: usize, timeout: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
            timeout: Duration::from_secs(timeout),
            batch_size: DEFAULT_BATCH_SIZE,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
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
                tracing::debug!(error = %e, "ollama embedding connection test failed");
                false
            }
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if !self.is_configured() {
            return Err(AppError::Configuration(
                "Ollama embedding client not configured (EMBEDDING_URL / EMBEDDING_MODEL)"
                    .to_string(),
            ));
        }
        if texts.is_empty() {
            return Ok(EmbeddingResult {
                embeddings: Vec::new(),
                model: self.model.clone(),
                dimensions: self.dimensions,
            });
        }

        let mut all_embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let response = self
                .client
                .post(format!("{}/api/embed", self.url))
                .json(&json!({ "model": self.model, "input": batch }))
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| AppError::External(format!("ollama embed request: {}", e)))?
                .error_for_status()
                .map_err(|e| AppError::External(format!("ollama embed: {}", e)))?;

            let payload: OllamaEmbedResponse = response.json().await.map_err(|e| {
                AppError::External(format!(
                    "unexpected ollama response (missing 'embeddings'): {}",
                    e
                ))
            })?;
            all_embeddings.extend(payload.embeddings);
        }

        let dimensions = all_embeddings
            .first()
            .map(Vec::len)
            .unwrap_or(self.dimensions);

        Ok(EmbeddingResult {
            embeddings: all_embeddings,
            model: self.model.clone(),
            dimensions,
        })
    }
}

// ============================================================================
// OpenAI-Compatible Client
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiEmbedResponse {
    data: Vec<ApiEmbedItem>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedItem {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedding client for OpenAI-compatible APIs (Bearer token auth).
pub struct ApiEmbeddingClient {
    url: String,
    model: String,
    api_key: String,
    dimensions: usize,
    timeout: Duration,
    batch_size: usize,
    client: reqwest::Client,
}

impl ApiEmbeddingClient {
    pub fn new(url: &str, model: &str, api_key: &str, dimensions: usize, timeout: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            dimensions,
            timeout: Duration::from_secs(timeout),
            batch_size: DEFAULT_BATCH_SIZE,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{}", self.url, path));
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        builder
    }
}

#[async_trait]
impl EmbeddingClient for ApiEmbeddingClient {
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
            .request("/v1/embeddings")
            .json(&json!({ "model": self.model, "input": ["test"] }))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match probe {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "api embedding connection test failed");
                false
            }
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if !self.is_configured() {
            return Err(AppError::Configuration(
                "API embedding client not configured (EMBEDDING_URL / EMBEDDING_MODEL)".to_string(),
            ));
        }
        if texts.is_empty() {
            return Ok(EmbeddingResult {
                embeddings: Vec::new(),
                model: self.model.clone(),
                dimensions: self.dimensions,
            });
        }

        let mut all_embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let response = self
                .request("/v1/embeddings")
                .json(&json!({ "model": self.model, "input": batch }))
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| AppError::External(format!("embedding request: {}", e)))?
                .error_for_status()
                .map_err(|e| AppError::External(format!("embedding API: {}", e)))?;

            let payload: ApiEmbedResponse = response.json().await.map_err(|e| {
                AppError::External(format!("unexpected embedding response (missing 'data'): {}", e))
            })?;

            // The API may return items out of order; restore input order.
            let mut items = payload.data;
            items.sort_by_key(|item| item.index);
            all_embeddings.extend(items.into_iter().map(|item| item.embedding));
        }

        let dimensions = all_embeddings
            .first()
            .map(Vec::len)
            .unwrap_or(self.dimensions);

        Ok(EmbeddingResult {
            embeddings: all_embeddings,
            model: self.model.clone(),
            dimensions,
        })
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Create an embedding client for the configured backend name.
pub fn create_embedding_client(
    backend: &str,
    model: &str,
    url: &str,
    api_key: &str,
    dimensions: usize,
    timeout: u64,
) -> Result<Box<dyn EmbeddingClient>> {
    match backend {
        "ollama" => Ok(Box::new(OllamaEmbeddingClient::new(
            url, model, dimensions, timeout,
        ))),
        "openai" | "api" => Ok(Box::new(ApiEmbeddingClient::new(
            url, model, api_key, dimensions, timeout,
        ))),
        _ => Err(AppError::Configuration(format!(
            "Unknown embedding backend: {}",
            backend
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_configured() {
        let client = OllamaEmbeddingClient::new("http://localhost:11434", "nomic-embed-text", 768, 60);
        assert!(client.is_configured());

        let unconfigured = OllamaEmbeddingClient::new("", "nomic-embed-text", 768, 60);
        assert!(!unconfigured.is_configured());

        let no_model = ApiEmbeddingClient::new("http://host", "", "key", 768, 60);
        assert!(!no_model.is_configured());
    }

    #[tokio::test]
    async fn test_empty_input_short_circuits() {
        let client = OllamaEmbeddingClient::new("http://localhost:11434", "m", 768, 60);
        let result = client.embed(&[]).await.unwrap();
        assert!(result.embeddings.is_empty());
        assert_eq!(result.dimensions, 768);
    }

    #[tokio::test]
    async fn test_unconfigured_embed_errors() {
        let client = ApiEmbeddingClient::new("", "m", "", 768, 60);
        let err = client.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = create_embedding_client("bert", "m", "http://h", "", 768, 60).unwrap_err();
        assert!(err.to_string().contains("bert"));
    }
}
