//! docling-serve parser backend (HTTP REST API).
//!
//! Converts documents to markdown via `POST {url}/v1/convert/file` with a
//! multipart file and `to_formats=md`. Health is `GET {url}/health`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::backends::ParserBackend;
use crate::types::{DocumentMetadata, ParserOutcome};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    #[serde(default)]
    document: ConvertedDocument,
}

#[derive(Debug, Default, Deserialize)]
struct ConvertedDocument {
    #[serde(default)]
    md_content: String,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
    #[serde(default)]
    page_count: Option<u32>,
}

/// Parser backend using the docling-serve REST API.
pub struct DoclingServeParser {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl DoclingServeParser {
    pub fn new(url: &str, timeout: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout),
            client: reqwest::Client::new(),
        }
    }

    fn failure(&self, error: impl Into<String>) -> ParserOutcome {
        ParserOutcome::Failure {
            error: error.into(),
            parser_name: self.name().to_string(),
        }
    }

    /// Pull title/author/creation_date/page_count out of the response,
    /// falling back to the first markdown heading for the title.
    fn extract_metadata(
        document: &ConvertedDocument,
        markdown: &str,
        parser_name: &str,
    ) -> serde_json::Map<String, Value> {
        let mut metadata = serde_json::Map::new();

        for key in ["title", "author", "creation_date"] {
            if let Some(value) = document.metadata.get(key) {
                match value {
                    Value::String(s) if s.is_empty() => {}
                    Value::Null => {}
                    other => {
                        metadata.insert(key.to_string(), other.clone());
                    }
                }
            }
        }
        if let Some(pages) = document.page_count {
            metadata.insert("page_count".to_string(), Value::from(pages));
        }

        if !metadata.contains_key("title") {
            for line in markdown.lines().take(20) {
                let line = line.trim();
                let heading = line
                    .strip_prefix("# ")
                    .or_else(|| line.strip_prefix("## "));
                if let Some(heading) = heading {
                    metadata.insert(
                        "title".to_string(),
                        Value::String(heading.trim().to_string()),
                    );
                    break;
                }
            }
        }

        metadata.insert(
            "parsed_by".to_string(),
            Value::String(parser_name.to_string()),
        );
        metadata
    }
}

#[async_trait]
impl ParserBackend for DoclingServeParser {
    fn name(&self) -> &'static str {
        "docling_serve"
    }

    async fn is_available(&self) -> bool {
        if self.url.is_empty() {
            return false;
        }
        match self
            .client
            .get(format!("{}/health", self.url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".pdf", ".docx", ".pptx", ".html"]
    }

    async fn parse(&self, path: &Path, _context: &DocumentMetadata) -> ParserOutcome {
        if self.url.is_empty() {
            return self.failure("DOCLING_SERVE_URL not configured");
        }
        if !path.exists() {
            return self.failure(format!("File not found: {}", path.display()));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return self.failure(format!("read {}: {}", path.display(), e)),
        };

        tracing::info!(file = %file_name, "parsing document with docling-serve");

        let form = reqwest::multipart::Form::new().part(
            "files",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone()),
        );

        let response = self
            .client
            .post(format!("{}/v1/convert/file", self.url))
            .query(&[("to_formats", "md")])
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return self.failure(format!(
                    "docling-serve request timed out after {}s for {}",
                    self.timeout.as_secs(),
                    file_name
                ));
            }
            Err(e) => return self.failure(format!("docling-serve request failed: {}", e)),
        };
        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => return self.failure(format!("docling-serve HTTP error: {}", e)),
        };

        let data: ConvertResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => return self.failure(format!("docling-serve malformed response: {}", e)),
        };

        if data.document.md_content.is_empty() {
            return self.failure(format!(
                "docling-serve returned empty markdown for {}",
                file_name
            ));
        }

        // Write the markdown next to the original.
        let markdown_path = path.with_extension("md");
        if let Err(e) = tokio::fs::write(&markdown_path, &data.document.md_content).await {
            return self.failure(format!("write {}: {}", markdown_path.display(), e));
        }

        let metadata =
            Self::extract_metadata(&data.document, &data.document.md_content, self.name());

        tracing::info!(
            markdown = %markdown_path.display(),
            chars = data.document.md_content.len(),
            "docling-serve parse successful"
        );

        ParserOutcome::Success {
            content_path: markdown_path,
            metadata,
            parser_name: self.name().to_string(),
        }
    }
}
