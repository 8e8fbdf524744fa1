//! Mock backend implementations shared across test files.
//!
//! These are scripted fakes: each one is configured with the outcome it
//! should produce and records what it was asked to do, so tests can assert
//! on both counters and call patterns without real services.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use landfall::backends::{ArchiveBackend, ParserBackend, RagBackend};
use landfall::types::{ArchiveOutcome, DocumentMetadata, ParserOutcome, RagOutcome};

// ============================================================================
// Parser
// ============================================================================

/// Scripted parser: on success writes a markdown sibling and returns the
/// given metadata; on failure returns the given error.
pub struct MockParser {
    fail_with: Option<String>,
    metadata: serde_json::Map<String, Value>,
    pub calls: Arc<AtomicUsize>,
}

impl MockParser {
    pub fn succeeding(metadata: serde_json::Map<String, Value>) -> Self {
        Self {
            fail_with: None,
            metadata,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            fail_with: Some(error.to_string()),
            metadata: serde_json::Map::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParserBackend for MockParser {
    fn name(&self) -> &'static str {
        "mock_parser"
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".pdf", ".html"]
    }

    async fn parse(&self, path: &Path, _context: &DocumentMetadata) -> ParserOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.fail_with {
            return ParserOutcome::Failure {
                error: error.clone(),
                parser_name: self.name().to_string(),
            };
        }
        let markdown_path = path.with_extension("md");
        std::fs::write(&markdown_path, "# Parsed\n\nextracted content words").unwrap();
        ParserOutcome::Success {
            content_path: markdown_path,
            metadata: self.metadata.clone(),
            parser_name: self.name().to_string(),
        }
    }
}

// ============================================================================
// Archive
// ============================================================================

/// Scripted archive: records archived paths/titles, returns a fixed task id
/// or error, and answers `verify` with a fixed result.
pub struct MockArchive {
    fail_with: Option<String>,
    task_id: String,
    verify_result: bool,
    pub archived: Arc<Mutex<Vec<(PathBuf, String)>>>,
    pub verify_calls: Arc<AtomicUsize>,
}

impl MockArchive {
    pub fn succeeding(task_id: &str, verify_result: bool) -> Self {
        Self {
            fail_with: None,
            task_id: task_id.to_string(),
            verify_result,
            archived: Arc::new(Mutex::new(Vec::new())),
            verify_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            fail_with: Some(error.to_string()),
            task_id: String::new(),
            verify_result: false,
            archived: Arc::new(Mutex::new(Vec::new())),
            verify_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ArchiveBackend for MockArchive {
    fn name(&self) -> &'static str {
        "mock_archive"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn archive(
        &self,
        path: &Path,
        title: &str,
        _created: Option<&str>,
        _correspondent: Option<&str>,
        _tags: &[String],
        _metadata: &serde_json::Map<String, Value>,
    ) -> ArchiveOutcome {
        if let Some(error) = &self.fail_with {
            return ArchiveOutcome::Failure {
                error: error.clone(),
                archive_name: self.name().to_string(),
            };
        }
        self.archived
            .lock()
            .push((path.to_path_buf(), title.to_string()));
        ArchiveOutcome::Success {
            document_id: self.task_id.clone(),
            url: None,
            archive_name: self.name().to_string(),
        }
    }

    async fn verify(&self, _document_id: &str, _timeout: u64) -> bool {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verify_result
    }
}

// ============================================================================
// RAG
// ============================================================================

/// Scripted RAG backend recording ingested paths and collections.
pub struct MockRag {
    fail_with: Option<String>,
    pub ingested: Arc<Mutex<Vec<(PathBuf, Option<String>)>>>,
}

impl MockRag {
    pub fn succeeding() -> Self {
        Self {
            fail_with: None,
            ingested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            fail_with: Some(error.to_string()),
            ingested: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl RagBackend for MockRag {
    fn name(&self) -> String {
        "mock_rag".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn test_connection(&self) -> bool {
        true
    }

    async fn ingest(
        &self,
        content_path: &Path,
        _metadata: &serde_json::Map<String, Value>,
        collection_id: Option<&str>,
    ) -> RagOutcome {
        if let Some(error) = &self.fail_with {
            return RagOutcome::Failure {
                error: error.clone(),
                rag_name: self.name(),
            };
        }
        self.ingested
            .lock()
            .push((content_path.to_path_buf(), collection_id.map(str::to_string)));
        RagOutcome::Success {
            document_id: content_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            collection_id: collection_id.map(str::to_string),
            rag_name: self.name(),
        }
    }
}
