//! Apache Tika client for text and metadata extraction.
//!
//! - Text extraction: `PUT {url}/tika` with raw file bytes
//! - Metadata: `PUT {url}/meta` with `Accept: application/json`, keys
//!   normalized from Dublin Core to standard names
//! - MIME detection: `PUT {url}/detect/stream`

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::types::{AppError, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Dublin Core → standard key mapping. First match wins; `meta:author`
/// ranks behind `dc:creator` by map order.
const METADATA_KEY_MAP: &[(&str, &str)] = &[
    ("dc:title", "title"),
    ("dc:creator", "author"),
    ("dc:description", "description"),
    ("dc:subject", "subject"),
    ("dc:language", "language"),
    ("dcterms:created", "creation_date"),
    ("dcterms:modified", "modification_date"),
    ("meta:page-count", "page_count"),
    ("xmpTPg:NPages", "page_count"),
    ("meta:word-count", "word_count"),
    ("meta:author", "author"),
    ("meta:creation-date", "creation_date"),
    ("pdf:PDFVersion", "pdf_version"),
    ("Content-Type", "content_type"),
];

/// Client for an Apache Tika server.
pub struct TikaClient {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl TikaClient {
    pub fn new(url: &str, timeout: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout),
            client: reqwest::Client::new(),
        }
    }

    /// Whether a Tika server URL is set.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    /// Check Tika server health (`GET /tika`).
    pub async fn health_check(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        match self
            .client
            .get(format!("{}/tika", self.url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn read_file(path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| AppError::External(format!("read {}: {}", path.display(), e)))
    }

    /// Extract plain text from a document.
    pub async fn extract_text(&self, path: &Path) -> Result<String> {
        let body = Self::read_file(path).await?;
        let response = self
            .client
            .put(format!("{}/tika", self.url))
            .header("Accept", "text/plain")
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::External(format!("tika text request: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::External(format!("tika text: {}", e)))?;

        response
            .text()
            .await
            .map_err(|e| AppError::External(format!("tika text body: {}", e)))
    }

    /// Extract and normalize document metadata.
    pub async fn extract_metadata(&self, path: &Path) -> Result<serde_json::Map<String, Value>> {
        let body = Self::read_file(path).await?;
        let response = self
            .client
            .put(format!("{}/meta", self.url))
            .header("Accept", "application/json")
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::External(format!("tika meta request: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::External(format!("tika meta: {}", e)))?;

        let raw: serde_json::Map<String, Value> = response
            .json()
            .await
            .map_err(|e| AppError::External(format!("tika meta body: {}", e)))?;

        Ok(Self::normalize_metadata(&raw))
    }

    /// Detect the MIME type of a file.
    pub async fn detect_mime_type(&self, path: &Path) -> Result<String> {
        let body = Self::read_file(path).await?;
        let response = self
            .client
            .put(format!("{}/detect/stream", self.url))
            .header("Accept", "text/plain")
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::External(format!("tika detect request: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::External(format!("tika detect: {}", e)))?;

        let text = response
            .text()
            .await
            .map_err(|e| AppError::External(format!("tika detect body: {}", e)))?;
        Ok(text.trim().to_string())
    }

    /// Normalize Tika metadata keys to standard names. Keys outside the
    /// mapping are dropped; counts that fail integer coercion are dropped.
    fn normalize_metadata(raw: &serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
        let mut normalized = serde_json::Map::new();

        for (raw_key, mapped_key) in METADATA_KEY_MAP {
            let Some(value) = raw.get(*raw_key) else {
                continue;
            };
            if normalized.contains_key(*mapped_key) {
                continue;
            }
            if matches!(*mapped_key, "page_count" | "word_count") {
                let count = match value {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                if let Some(count) = count {
                    normalized.insert(mapped_key.to_string(), Value::from(count));
                }
                continue;
            }
            normalized.insert(mapped_key.to_string(), value.clone());
        }

        normalized
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_normalize_dublin_core_keys() {
        let normalized = TikaClient::normalize_metadata(&raw(&[
            ("dc:title", json!("Report")),
            ("dc:creator", json!("Alice")),
            ("dcterms:created", json!("2024-01-15T00:00:00Z")),
            ("Content-Type", json!("application/pdf")),
            ("X-Unknown", json!("dropped")),
        ]));

        assert_eq!(normalized.get("title"), Some(&json!("Report")));
        assert_eq!(normalized.get("author"), Some(&json!("Alice")));
        assert_eq!(
            normalized.get("creation_date"),
            Some(&json!("2024-01-15T00:00:00Z"))
        );
        assert_eq!(normalized.get("content_type"), Some(&json!("application/pdf")));
        assert!(!normalized.contains_key("X-Unknown"));
    }

    #[test]
    fn test_author_first_seen_wins() {
        let normalized = TikaClient::normalize_metadata(&raw(&[
            ("dc:creator", json!("Primary")),
            ("meta:author", json!("Secondary")),
        ]));
        assert_eq!(normalized.get("author"), Some(&json!("Primary")));

        let only_meta = TikaClient::normalize_metadata(&raw(&[("meta:author", json!("Solo"))]));
        assert_eq!(only_meta.get("author"), Some(&json!("Solo")));
    }

    #[test]
    fn test_page_count_coercion() {
        let normalized = TikaClient::normalize_metadata(&raw(&[("meta:page-count", json!("12"))]));
        assert_eq!(normalized.get("page_count"), Some(&json!(12)));

        let bad = TikaClient::normalize_metadata(&raw(&[("meta:page-count", json!("dozen"))]));
        assert!(!bad.contains_key("page_count"));

        let numeric = TikaClient::normalize_metadata(&raw(&[("xmpTPg:NPages", json!(7))]));
        assert_eq!(numeric.get("page_count"), Some(&json!(7)));
    }

    #[test]
    fn test_unconfigured() {
        let client = TikaClient::new("", 120);
        assert!(!client.is_configured());
    }
}
