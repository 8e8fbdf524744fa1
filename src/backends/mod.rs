//! Backend capability contracts.
//!
//! The pipeline consumes exactly these traits; concrete implementations are
//! hidden behind the backend registry and resolved through the service
//! container. Each contract carries a name, a readiness query, and a
//! connectivity probe alongside its domain methods.

pub mod archives;
pub mod parsers;
pub mod rag;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ArchiveOutcome, DocumentMetadata, ParserOutcome, RagOutcome, Result};

/// Contract for document parsers (raw file → canonical markdown).
#[async_trait]
pub trait ParserBackend: Send + Sync {
    /// Parser name for logging/identification.
    fn name(&self) -> &'static str;

    /// Whether the parser's dependencies are reachable.
    async fn is_available(&self) -> bool;

    /// Supported file extensions (with leading dot).
    fn supported_extensions(&self) -> &'static [&'static str];

    /// Parse a document to markdown. Scraper-provided metadata is passed
    /// for context (URL, date, organization).
    async fn parse(&self, path: &Path, context: &DocumentMetadata) -> ParserOutcome;
}

impl std::fmt::Debug for dyn ParserBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserBackend").field("name", &self.name()).finish()
    }
}

/// Contract for long-term document archives.
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Archive name for logging/identification.
    fn name(&self) -> &'static str;

    /// Whether the archive has valid configuration.
    fn is_configured(&self) -> bool;

    /// Availability defaults to configuration; implementations may add a
    /// connectivity check.
    async fn is_available(&self) -> bool {
        self.is_configured()
    }

    /// Upload a document with its metadata. The returned `document_id` is
    /// the handle for [`ArchiveBackend::verify`]. A non-empty `metadata`
    /// map is held back and applied as custom fields once verification
    /// succeeds.
    #[allow(clippy::too_many_arguments)]
    async fn archive(
        &self,
        path: &Path,
        title: &str,
        created: Option<&str>,
        correspondent: Option<&str>,
        tags: &[String],
        metadata: &serde_json::Map<String, Value>,
    ) -> ArchiveOutcome;

    /// Poll until the archive reports a concrete archived-document
    /// identifier or `timeout` seconds pass. Returns whether one was
    /// obtained.
    async fn verify(&self, document_id: &str, timeout: u64) -> bool;
}

impl std::fmt::Debug for dyn ArchiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBackend").field("name", &self.name()).finish()
    }
}

/// A document listed by a RAG backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Contract for RAG systems (semantic index over document content).
#[async_trait]
pub trait RagBackend: Send + Sync {
    /// RAG backend name for logging/identification.
    fn name(&self) -> String;

    /// Whether the backend has valid configuration.
    fn is_configured(&self) -> bool;

    /// Availability defaults to configuration; implementations may add a
    /// connectivity check.
    async fn is_available(&self) -> bool {
        self.is_configured()
    }

    /// Probe connectivity to the RAG service.
    async fn test_connection(&self) -> bool;

    /// Ingest a content file into the index. RAG failures are non-fatal,
    /// so this returns an outcome instead of erroring.
    async fn ingest(
        &self,
        content_path: &Path,
        metadata: &serde_json::Map<String, Value>,
        collection_id: Option<&str>,
    ) -> RagOutcome;

    /// List documents in a collection. Not all backends support this.
    async fn list_documents(&self, _collection_id: Option<&str>) -> Result<Vec<RagDocument>> {
        Ok(Vec::new())
    }
}
