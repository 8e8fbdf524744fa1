//! PDF renderer client (Gotenberg-style).
//!
//! Converts markdown, HTML, and office documents to PDF through a remote
//! rendering service. The response is treated as an opaque byte stream; any
//! non-2xx response is an error and the caller falls back to archiving the
//! original file.

use std::path::Path;
use std::time::Duration;

use crate::types::{AppError, Result};

/// Wrapper HTML used for markdown conversion; the chromium route renders
/// `index.html` and inlines the markdown file.
const MARKDOWN_INDEX_HTML: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"></head>
  <body>
    <div id="content">{{ toHTML "document.md" }}</div>
  </body>
</html>
"#;

/// Client for a Gotenberg-style PDF rendering service.
pub struct RendererClient {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl RendererClient {
    pub fn new(url: &str, timeout: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout),
            client: reqwest::Client::new(),
        }
    }

    /// Whether a renderer URL is set.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    async fn read_file(path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| AppError::External(format!("read {}: {}", path.display(), e)))
    }

    async fn convert(&self, route: &str, form: reqwest::multipart::Form) -> Result<Vec<u8>> {
        if !self.is_configured() {
            return Err(AppError::Configuration(
                "PDF renderer not configured (GOTENBERG_URL)".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}{}", self.url, route))
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::External(format!("renderer request: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::External(format!("renderer: {}", e)))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::External(format!("renderer body: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// Render a markdown file to PDF bytes.
    pub async fn markdown_to_pdf(&self, path: &Path) -> Result<Vec<u8>> {
        let body = Self::read_file(path).await?;
        let form = reqwest::multipart::Form::new()
            .part(
                "files",
                reqwest::multipart::Part::bytes(MARKDOWN_INDEX_HTML.as_bytes().to_vec())
                    .file_name("index.html")
                    .mime_str("text/html")
                    .map_err(|e| AppError::Internal(e.to_string()))?,
            )
            .part(
                "files",
                reqwest::multipart::Part::bytes(body)
                    .file_name("document.md")
                    .mime_str("text/markdown")
                    .map_err(|e| AppError::Internal(e.to_string()))?,
            );
        self.convert("/forms/chromium/convert/markdown", form).await
    }

    /// Render an HTML file to PDF bytes.
    pub async fn html_to_pdf(&self, path: &Path) -> Result<Vec<u8>> {
        let body = Self::read_file(path).await?;
        let form = reqwest::multipart::Form::new().part(
            "files",
            reqwest::multipart::Part::bytes(body)
                .file_name("index.html")
                .mime_str("text/html")
                .map_err(|e| AppError::Internal(e.to_string()))?,
        );
        self.convert("/forms/chromium/convert/html", form).await
    }

    /// Render an office document (docx, xlsx, pptx, ...) to PDF bytes.
    pub async fn office_to_pdf(&self, path: &Path) -> Result<Vec<u8>> {
        let body = Self::read_file(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        let form = reqwest::multipart::Form::new().part(
            "files",
            reqwest::multipart::Part::bytes(body).file_name(filename),
        );
        self.convert("/forms/libreoffice/convert", form).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured() {
        assert!(!RendererClient::new("", 60).is_configured());
        assert!(RendererClient::new("http://gotenberg:3000", 60).is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_convert_errors() {
        let client = RendererClient::new("", 60);
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = client.html_to_pdf(file.path()).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
