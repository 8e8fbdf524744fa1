//! Tika parser backend.
//!
//! Extracts plain text through an Apache Tika server and writes it as the
//! document's markdown sibling. Used for office formats the structure-aware
//! parser doesn't cover; metadata comes from Tika's `/meta` endpoint
//! already normalized.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backends::ParserBackend;
use crate::clients::TikaClient;
use crate::types::{DocumentMetadata, ParserOutcome};

/// Parser backend using an Apache Tika server.
pub struct TikaParser {
    client: Arc<TikaClient>,
}

impl TikaParser {
    pub fn new(client: Arc<TikaClient>) -> Self {
        Self { client }
    }

    fn failure(&self, error: impl Into<String>) -> ParserOutcome {
        ParserOutcome::Failure {
            error: error.into(),
            parser_name: self.name().to_string(),
        }
    }
}

#[async_trait]
impl ParserBackend for TikaParser {
    fn name(&self) -> &'static str {
        "tika"
    }

    async fn is_available(&self) -> bool {
        self.client.health_check().await
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[
            ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".odt", ".rtf", ".html",
        ]
    }

    async fn parse(&self, path: &Path, _context: &DocumentMetadata) -> ParserOutcome {
        if !self.client.is_configured() {
            return self.failure("TIKA_SERVER_URL not configured");
        }
        if !path.exists() {
            return self.failure(format!("File not found: {}", path.display()));
        }

        let text = match self.client.extract_text(path).await {
            Ok(text) => text,
            Err(e) => return self.failure(format!("tika extraction failed: {}", e)),
        };
        if text.trim().is_empty() {
            return self.failure(format!("tika returned empty text for {}", path.display()));
        }

        let markdown_path = path.with_extension("md");
        if let Err(e) = tokio::fs::write(&markdown_path, &text).await {
            return self.failure(format!("write {}: {}", markdown_path.display(), e));
        }

        // Metadata extraction failure is not fatal to the parse.
        let mut metadata = match self.client.extract_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(error = %e, "tika metadata extraction failed");
                serde_json::Map::new()
            }
        };
        metadata.insert(
            "parsed_by".to_string(),
            serde_json::Value::String(self.name().to_string()),
        );

        ParserOutcome::Success {
            content_path: markdown_path,
            metadata,
            parser_name: self.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_fails() {
        let parser = TikaParser::new(Arc::new(TikaClient::new("", 120)));
        let outcome = parser
            .parse(Path::new("/tmp/doc.docx"), &DocumentMetadata::default())
            .await;
        assert!(!outcome.is_success());
        assert!(outcome.error().unwrap().contains("TIKA_SERVER_URL"));
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let parser = TikaParser::new(Arc::new(TikaClient::new("http://tika:9998", 120)));
        let outcome = parser
            .parse(Path::new("/missing/doc.docx"), &DocumentMetadata::default())
            .await;
        assert!(!outcome.is_success());
        assert!(outcome.error().unwrap().contains("File not found"));
    }
}
