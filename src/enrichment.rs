//! Document enrichment via LLM.
//!
//! Tier 1: document-level metadata extraction (title, summary, keywords,
//! entities, tags, type, topics) as strict JSON.
//! Tier 2: per-chunk situating paragraphs used for embedding only.
//!
//! Every failure path degrades to "no enrichment" — callers fill gaps only
//! and never depend on this service succeeding.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::llm::{ChatMessage, LlmClient, ResponseFormat};
use crate::types::{AppError, Chunk, Result};

/// Tier 1 system prompt — requests structured JSON metadata.
const TIER1_SYSTEM_PROMPT: &str = "\
You are a document analysis assistant. Given the full text of a document, \
extract structured metadata as JSON with these exact keys:

- \"title\": The document's title (string)
- \"summary\": A 2-3 sentence summary (string)
- \"keywords\": 5-10 relevant keywords (list of strings)
- \"entities\": Named entities — organizations, people, locations (list of strings)
- \"suggested_tags\": 3-7 category tags for filing (list of strings)
- \"document_type\": One of: report, policy, guideline, regulation, legislation, \
standard, manual, briefing, correspondence, media_release, submission, other (string)
- \"key_topics\": 3-5 main topics discussed (list of strings)

Respond with ONLY valid JSON, no markdown formatting or explanation.";

/// Tier 2 system prompt — requests a plain-text contextual description.
const TIER2_SYSTEM_PROMPT: &str = "\
You are a document analysis assistant. Given a chunk of text from a larger document, \
along with context about the document's structure and surrounding content, write a \
short 2-3 sentence paragraph that situates this chunk within the document.

Explain what section this chunk belongs to, what the document is about, and how this \
chunk relates to the broader content. This description will be prepended to the chunk \
to improve search retrieval.

Respond with ONLY the situating paragraph in plain text, no markdown formatting.";

/// Service for enriching documents and chunks with LLM-generated metadata.
pub struct DocumentEnrichmentService {
    llm: Arc<dyn LlmClient>,
    max_tokens: usize,
}

impl DocumentEnrichmentService {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: usize) -> Self {
        Self { llm, max_tokens }
    }

    fn char_limit(&self) -> usize {
        // ~4 chars per token
        self.max_tokens * 4
    }

    /// Tier 1: extract structured metadata from a document.
    ///
    /// Returns `None` on any failure: unreadable/empty file, LLM error,
    /// invalid JSON, or a non-object JSON value.
    pub async fn enrich_metadata(
        &self,
        content_path: &Path,
    ) -> Option<serde_json::Map<String, Value>> {
        let text = match tokio::fs::read_to_string(content_path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %content_path.display(), error = %e, "enrichment read failed");
                return None;
            }
        };
        if text.trim().is_empty() {
            tracing::warn!(path = %content_path.display(), "empty document, skipping enrichment");
            return None;
        }

        let mut text = text;
        let limit = self.char_limit();
        if text.len() > limit {
            text.truncate(floor_char_boundary(&text, limit));
            tracing::debug!(limit, "truncated document for enrichment");
        }

        let messages = [
            ChatMessage::system(TIER1_SYSTEM_PROMPT),
            ChatMessage::user(text),
        ];
        let result = match self.llm.chat(&messages, Some(ResponseFormat::Json), None).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "LLM enrichment failed (non-fatal)");
                return None;
            }
        };

        match serde_json::from_str::<Value>(&result.content) {
            Ok(Value::Object(map)) => {
                tracing::debug!(fields = map.len(), "LLM enrichment extracted metadata");
                Some(map)
            }
            Ok(_) => {
                tracing::warn!("LLM returned non-object JSON, skipping enrichment");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM returned invalid JSON");
                None
            }
        }
    }

    // ---- Tier 2: chunk-level contextual enrichment ----

    /// Extract markdown headings as a document outline (up to 50 lines).
    fn extract_outline(text: &str) -> String {
        text.lines()
            .filter(|line| line.starts_with('#'))
            .take(50)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Context block for one chunk of a long document: outline plus a
    /// symmetric window of truncated neighbor chunks. Errors here are
    /// document-level, not per-chunk.
    fn build_chunk_context(
        chunk_idx: usize,
        chunk_content: &str,
        all_chunks: &[Chunk],
        outline: &str,
        window: usize,
    ) -> Result<String> {
        let mut parts = vec![format!("Document outline:\n{}\n", outline)];

        let start = chunk_idx.saturating_sub(window);
        let end = (chunk_idx + window + 1).min(all_chunks.len());
        for i in start..end {
            if i == chunk_idx {
                continue;
            }
            let neighbor_chunk = all_chunks.get(i).ok_or_else(|| {
                AppError::Internal(format!("chunk window index {} out of range", i))
            })?;
            let content = &neighbor_chunk.content;
            let neighbor = &content[..floor_char_boundary(content, 200)];
            let label = if i < chunk_idx { "preceding" } else { "following" };
            parts.push(format!("[{} chunk {}]: {}", label, i, neighbor));
        }

        parts.push(format!("\nCurrent chunk ({}):\n{}", chunk_idx, chunk_content));
        Ok(parts.join("\n\n"))
    }

    /// Context for a chunk of a document that fits the token budget: the
    /// (possibly truncated) full text plus the current chunk.
    fn short_document_context(
        full_text: &str,
        chunk: &Chunk,
        chunk_idx: usize,
        char_limit: usize,
    ) -> String {
        // Leave room for the chunk content and prompt overhead.
        let max_doc_chars = char_limit.saturating_sub(chunk.content.len() + 500);
        let doc_text = &full_text[..floor_char_boundary(full_text, max_doc_chars)];
        format!(
            "Full document:\n{}\n\nCurrent chunk ({}):\n{}",
            doc_text, chunk_idx, chunk.content
        )
    }

    /// Tier 2: produce one enriched text per chunk (situating paragraph
    /// prepended to the raw content), for embedding only.
    ///
    /// Two fallback tiers: a failed chat call falls back to the raw content
    /// of that chunk only; a failure of the document-level setup (outline,
    /// context windows) falls back to raw content for every chunk.
    pub async fn enrich_chunks(
        &self,
        chunks: &[Chunk],
        full_text: &str,
        window: usize,
    ) -> Vec<String> {
        if chunks.is_empty() {
            return Vec::new();
        }

        match self.try_enrich_chunks(chunks, full_text, window).await {
            Ok(enriched) => enriched,
            Err(e) => {
                tracing::warn!(error = %e, "chunk enrichment failed entirely, using raw content");
                chunks.iter().map(|c| c.content.clone()).collect()
            }
        }
    }

    /// The fallible per-document enrichment pass. Any error escaping this
    /// scope is a global failure handled by [`Self::enrich_chunks`];
    /// per-chunk chat failures are absorbed inside the loop.
    async fn try_enrich_chunks(
        &self,
        chunks: &[Chunk],
        full_text: &str,
        window: usize,
    ) -> Result<Vec<String>> {
        let outline = Self::extract_outline(full_text);
        let char_limit = self.char_limit();
        let is_short = full_text.len() <= char_limit;

        let mut enriched = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let context = if is_short {
                Self::short_document_context(full_text, chunk, i, char_limit)
            } else {
                Self::build_chunk_context(i, &chunk.content, chunks, &outline, window)?
            };

            let messages = [
                ChatMessage::system(TIER2_SYSTEM_PROMPT),
                ChatMessage::user(context),
            ];
            match self.llm.chat(&messages, None, None).await {
                Ok(result) => {
                    let situating = result.content.trim().to_string();
                    enriched.push(format!("{}\n\n{}", situating, chunk.content));
                }
                Err(e) => {
                    tracing::warn!(chunk = i, error = %e, "chunk enrichment failed, using raw content");
                    enriched.push(chunk.content.clone());
                }
            }
        }

        Ok(enriched)
    }
}

/// Largest byte index `<= limit` that falls on a char boundary.
fn floor_char_boundary(text: &str, limit: usize) -> usize {
    if limit >= text.len() {
        return text.len();
    }
    let mut idx = limit;
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

// ============================================================================
// Tests
// ============================================================================
