//! Core types used throughout the Landfall pipeline.
//!
//! This module contains the common data structures used for:
//! - Document metadata flowing from scraper to archive and RAG
//! - Backend outcome types (parse, archive, RAG ingest)
//! - Chunks and search hits
//! - Pipeline run results and counters
//! - Error handling

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============= Document Metadata =============

/// Metadata for a single scraped document.
///
/// Created by the scraper, mutated by the pipeline at defined merge points,
/// and serialized into the archive and the RAG store at the end of a run.
/// `url` and `filename` are always populated before ingestion; every other
/// field may be empty and is filled in priority order by
/// parser → enricher → scraper-provided defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Source URL the document was scraped from.
    pub url: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Canonical on-disk filename.
    pub filename: String,
    /// Publication date (ISO-8601 string).
    #[serde(default)]
    pub publication_date: String,
    /// Originating organization (archive correspondent).
    #[serde(default)]
    pub organization: String,
    /// Tag set.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Document type (report, policy, ...).
    #[serde(default)]
    pub document_type: String,
    /// Author, filled by parser or enrichment.
    #[serde(default)]
    pub author: String,
    /// Page count, filled by parser or enrichment.
    #[serde(default)]
    pub page_count: Option<u32>,
    /// Language code.
    #[serde(default)]
    pub language: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Keyword list.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Preview image URL.
    #[serde(default)]
    pub image_url: String,
    /// Free-form extras (deep-merged on metadata merge).
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl DocumentMetadata {
    /// Create metadata with the two required fields set.
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// Flatten into a string-keyed JSON map for archive custom fields and
    /// chunk metadata propagation. Empty scalar fields are omitted.
    pub fn to_map(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        let scalars = [
            ("url", &self.url),
            ("title", &self.title),
            ("filename", &self.filename),
            ("publication_date", &self.publication_date),
            ("organization", &self.organization),
            ("document_type", &self.document_type),
            ("author", &self.author),
            ("language", &self.language),
            ("description", &self.description),
            ("image_url", &self.image_url),
        ];
        for (key, value) in scalars {
            if !value.is_empty() {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        if let Some(pages) = self.page_count {
            map.insert("page_count".to_string(), Value::from(pages));
        }
        if !self.tags.is_empty() {
            map.insert(
                "tags".to_string(),
                Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if !self.keywords.is_empty() {
            map.insert(
                "keywords".to_string(),
                Value::Array(self.keywords.iter().cloned().map(Value::String).collect()),
            );
        }
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

// ============= Backend Outcome Types =============

/// Outcome of parsing one document.
///
/// The success and failure arms are mutually exclusive by construction:
/// a success always carries a content path, a failure always carries an
/// error message, and both carry the parser name for logging.
#[derive(Debug, Clone)]
pub enum ParserOutcome {
    /// Parse succeeded; content was written to `content_path`.
    Success {
        content_path: PathBuf,
        metadata: serde_json::Map<String, Value>,
        parser_name: String,
    },
    /// Parse failed.
    Failure { error: String, parser_name: String },
}

impl ParserOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure { error, .. } => Some(error),
            Self::Success { .. } => None,
        }
    }

    pub fn parser_name(&self) -> &str {
        match self {
            Self::Success { parser_name, .. } | Self::Failure { parser_name, .. } => parser_name,
        }
    }
}

/// Outcome of archiving one document.
#[derive(Debug, Clone)]
pub enum ArchiveOutcome {
    /// Upload accepted; `document_id` is the archive task identifier used
    /// for verification.
    Success {
        document_id: String,
        url: Option<String>,
        archive_name: String,
    },
    /// Upload rejected or failed.
    Failure { error: String, archive_name: String },
}

impl ArchiveOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Success { document_id, .. } => Some(document_id),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure { error, .. } => Some(error),
            Self::Success { .. } => None,
        }
    }

    pub fn archive_name(&self) -> &str {
        match self {
            Self::Success { archive_name, .. } | Self::Failure { archive_name, .. } => archive_name,
        }
    }
}

/// Outcome of ingesting one document into a RAG backend.
///
/// RAG failures are non-fatal to the pipeline, so backends return this
/// instead of erroring through `Result`.
#[derive(Debug, Clone)]
pub enum RagOutcome {
    Success {
        document_id: String,
        collection_id: Option<String>,
        rag_name: String,
    },
    Failure { error: String, rag_name: String },
}

impl RagOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Success { document_id, .. } => Some(document_id),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure { error, .. } => Some(error),
            Self::Success { .. } => None,
        }
    }

    pub fn rag_name(&self) -> &str {
        match self {
            Self::Success { rag_name, .. } | Self::Failure { rag_name, .. } => rag_name,
        }
    }
}

// ============= Chunks =============

/// A single chunk of document text with positional and contextual metadata.
///
/// `metadata` always contains `chunk_index` equal to `index`; the fixed
/// chunker adds `word_start`/`word_end`/`heading_context`, the hybrid chunker
/// adds `num_tokens`/`headings`, and the caller's document-level metadata is
/// shallow-copied in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub index: usize,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// A chunk row returned from a vector store read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_index: i32,
    pub content: String,
    pub metadata: serde_json::Map<String, Value>,
}

/// A single vector search hit, ordered by descending `score`
/// (`score = 1 - cosine distance`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub source: String,
    pub filename: String,
    pub chunk_index: i32,
    pub content: String,
    pub metadata: serde_json::Map<String, Value>,
    pub score: f64,
}

// ============= Pipeline Results =============

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Every document processed without a fatal error.
    Completed,
    /// At least one document failed; the rest were processed.
    Partial,
    /// The scraper itself failed before/while yielding documents.
    Failed,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Aggregated counters and timings for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub status: PipelineStatus,
    pub scraper_name: String,
    pub scraped_count: u32,
    pub downloaded_count: u32,
    pub parsed_count: u32,
    pub archived_count: u32,
    pub verified_count: u32,
    pub rag_indexed_count: u32,
    pub failed_count: u32,
    pub duration_seconds: f64,
    pub started_at: String,
    pub completed_at: Option<String>,
    /// Wall-clock seconds accumulated per named step.
    pub step_times: BTreeMap<String, f64>,
    /// `"{title}: {error}"` strings for every failed document.
    pub errors: Vec<String>,
}

impl PipelineResult {
    pub fn new(scraper_name: impl Into<String>) -> Self {
        Self {
            status: PipelineStatus::Failed,
            scraper_name: scraper_name.into(),
            scraped_count: 0,
            downloaded_count: 0,
            parsed_count: 0,
            archived_count: 0,
            verified_count: 0,
            rag_indexed_count: 0,
            failed_count: 0,
            duration_seconds: 0.0,
            started_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
            step_times: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ============= Error Handling =============

/// Application error type for all Landfall operations.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration error (missing URL/credential, invalid backend name,
    /// invalid template, bad chunker parameters). Raised at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input validation failed at an operation boundary.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested resource was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Parser backend failure. Fatal for the current document.
    #[error("Parser error: {0}")]
    Parser(String),

    /// Archive backend failure. Fatal for the current document.
    #[error("Archive error: {0}")]
    Archive(String),

    /// External service call failed (renderer, tika, embedding, ...).
    #[error("External service error: {0}")]
    External(String),

    /// LLM operation failed.
    #[error("LLM error: {0}")]
    LLM(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// The inner message without the kind prefix, for user-facing
    /// summaries that already name the document.
    pub fn message(&self) -> &str {
        match self {
            AppError::Configuration(m)
            | AppError::InvalidInput(m)
            | AppError::NotFound(m)
            | AppError::Database(m)
            | AppError::Parser(m)
            | AppError::Archive(m)
            | AppError::External(m)
            | AppError::LLM(m)
            | AppError::Internal(m) => m,
        }
    }

    /// Whether this error aborts the current document's archive path.
    /// Parser and archive errors are fatal for the document; everything
    /// else is recoverable at the pipeline level.
    pub fn is_document_fatal(&self) -> bool {
        matches!(self, AppError::Parser(_) | AppError::Archive(_))
    }
}

/// A specialized Result type for Landfall operations.
pub type Result<T> = std::result::Result<T, AppError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_exclusivity() {
        let ok = ParserOutcome::Success {
            content_path: PathBuf::from("/tmp/doc.md"),
            metadata: serde_json::Map::new(),
            parser_name: "docling_serve".into(),
        };
        assert!(ok.is_success());
        assert!(ok.error().is_none());

        let err = ParserOutcome::Failure {
            error: "boom".into(),
            parser_name: "docling_serve".into(),
        };
        assert!(!err.is_success());
        assert_eq!(err.error(), Some("boom"));
        assert_eq!(err.parser_name(), "docling_serve");
    }

    #[test]
    fn test_archive_outcome_accessors() {
        let ok = ArchiveOutcome::Success {
            document_id: "task-1".into(),
            url: Some("http://archive/tasks/task-1".into()),
            archive_name: "paperless".into(),
        };
        assert_eq!(ok.document_id(), Some("task-1"));
        assert!(ok.error().is_none());

        let err = ArchiveOutcome::Failure {
            error: "Service unavailable".into(),
            archive_name: "paperless".into(),
        };
        assert!(err.document_id().is_none());
        assert_eq!(err.error(), Some("Service unavailable"));
    }

    #[test]
    fn test_metadata_to_map_skips_empty() {
        let mut meta = DocumentMetadata::new("http://x/doc", "doc.pdf");
        meta.title = "T".into();
        meta.page_count = Some(3);
        meta.extra
            .insert("llm_summary".into(), Value::String("s".into()));

        let map = meta.to_map();
        assert_eq!(map.get("title"), Some(&Value::String("T".into())));
        assert_eq!(map.get("page_count"), Some(&Value::from(3)));
        assert_eq!(map.get("llm_summary"), Some(&Value::String("s".into())));
        assert!(!map.contains_key("organization"));
        assert!(!map.contains_key("tags"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::Parser("x".into()).is_document_fatal());
        assert!(AppError::Archive("x".into()).is_document_fatal());
        assert!(!AppError::External("x".into()).is_document_fatal());
        assert!(!AppError::LLM("x".into()).is_document_fatal());
    }

    #[test]
    fn test_pipeline_result_serializes() {
        let result = PipelineResult::new("acme");
        let json = result.to_json();
        assert!(json.contains("\"status\": \"failed\""));
        assert!(json.contains("\"scraper_name\": \"acme\""));
    }
}
