//! Text chunking for RAG ingestion.
//!
//! This module provides the chunking strategies used before embedding:
//! - **Fixed**: word-boundary chunking with overlap and heading tracking
//! - **Hybrid**: structure-aware chunking via a docling-serve endpoint,
//!   falling back to the fixed strategy on any error

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{AppError, Chunk, Result};

// ============================================================================
// Chunking Strategy Types
// ============================================================================

/// Available chunking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkingStrategy {
    /// Word-boundary chunking with overlap.
    Fixed,
    /// Structure-aware chunking via docling-serve, with fixed fallback.
    #[default]
    Hybrid,
}

impl FromStr for ChunkingStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fixed" | "word" => Ok(Self::Fixed),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(AppError::Configuration(format!(
                "Unknown chunking strategy: {}. Use: fixed, hybrid",
                s
            ))),
        }
    }
}

/// Chunker contract consumed by the RAG adapter.
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    /// Split text into ordered chunks. Document-level `metadata` is
    /// shallow-copied into each chunk's metadata. Empty/whitespace input
    /// yields an empty list.
    async fn chunk(&self, text: &str, metadata: &serde_json::Map<String, Value>) -> Vec<Chunk>;
}

// ============================================================================
// Fixed Word-Boundary Chunker
// ============================================================================

/// Fixed-size word-boundary chunker with overlap.
///
/// Splits on whitespace and slides a window of `max_tokens` words with step
/// `max_tokens - overlap_tokens`. Markdown headings (lines whose first
/// non-whitespace character is `#`) are tracked so each chunk carries the
/// most recent heading at its start position as `heading_context`.
#[derive(Debug, Clone)]
pub struct FixedChunker {
    max_tokens: usize,
    overlap_tokens: usize,
}

impl FixedChunker {
    /// Create a fixed chunker. Requires `max_tokens >= 1` and
    /// `0 <= overlap_tokens < max_tokens`.
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Result<Self> {
        if max_tokens < 1 {
            return Err(AppError::Configuration(
                "max_tokens must be >= 1".to_string(),
            ));
        }
        if overlap_tokens >= max_tokens {
            return Err(AppError::Configuration(format!(
                "overlap_tokens ({}) must be < max_tokens ({})",
                overlap_tokens, max_tokens
            )));
        }
        Ok(Self {
            max_tokens,
            overlap_tokens,
        })
    }

    /// Map every word position to the heading in effect at that position.
    /// Positions before the first heading have no entry.
    fn build_heading_map(text: &str) -> Vec<(usize, String)> {
        let mut headings: Vec<(usize, String)> = Vec::new();
        let mut word_pos = 0usize;

        for line in text.lines() {
            let stripped = line.trim();
            let line_words = line.split_whitespace().count();

            if stripped.starts_with('#') {
                let heading = stripped.trim_start_matches('#').trim();
                if !heading.is_empty() && line_words > 0 {
                    headings.push((word_pos, heading.to_string()));
                }
            }
            word_pos += line_words;
        }
        headings
    }

    /// Most recent heading at or before `word_idx`.
    fn heading_at(headings: &[(usize, String)], word_idx: usize) -> Option<&str> {
        match headings.binary_search_by_key(&word_idx, |(pos, _)| *pos) {
            Ok(i) => Some(headings[i].1.as_str()),
            Err(0) => None,
            Err(i) => Some(headings[i - 1].1.as_str()),
        }
    }

    fn chunk_words(&self, text: &str, base: &serde_json::Map<String, Value>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let headings = Self::build_heading_map(text);
        let step = self.max_tokens - self.overlap_tokens;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut index = 0usize;

        while start < words.len() {
            let end = (start + self.max_tokens).min(words.len());
            let content = words[start..end].join(" ");

            let mut metadata = base.clone();
            metadata.insert("chunk_index".to_string(), Value::from(index));
            metadata.insert("word_start".to_string(), Value::from(start));
            metadata.insert("word_end".to_string(), Value::from(end));
            if let Some(heading) = Self::heading_at(&headings, start) {
                metadata.insert(
                    "heading_context".to_string(),
                    Value::String(heading.to_string()),
                );
            }

            chunks.push(Chunk {
                content,
                index,
                metadata,
            });
            index += 1;

            if end >= words.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[async_trait]
impl Chunker for FixedChunker {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn chunk(&self, text: &str, metadata: &serde_json::Map<String, Value>) -> Vec<Chunk> {
        self.chunk_words(text, metadata)
    }
}

// ============================================================================
// Hybrid (Structure-Aware) Chunker
// ============================================================================

#[derive(Debug, Deserialize)]
struct HybridResponse {
    #[serde(default)]
    chunks: Vec<HybridChunkItem>,
}

#[derive(Debug, Deserialize)]
struct HybridChunkItem {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    raw_text: Option<String>,
    #[serde(default)]
    headings: Vec<String>,
    #[serde(default)]
    num_tokens: Option<u64>,
    #[serde(default)]
    chunk_index: Option<usize>,
}

/// Structure-aware chunker using docling-serve's hybrid chunking endpoint.
///
/// Sends the document body as a markdown upload and preserves the endpoint's
/// `chunk_index`, `num_tokens`, and `headings` (last heading becomes
/// `heading_context`). Any error falls back to [`FixedChunker`] with the
/// same parameters.
pub struct HybridChunker {
    url: String,
    timeout: Duration,
    max_tokens: usize,
    client: reqwest::Client,
    fallback: FixedChunker,
}

impl HybridChunker {
    pub fn new(
        max_tokens: usize,
        overlap_tokens: usize,
        docling_serve_url: &str,
        docling_serve_timeout: u64,
    ) -> Result<Self> {
        Ok(Self {
            url: docling_serve_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(docling_serve_timeout),
            max_tokens,
            client: reqwest::Client::new(),
            fallback: FixedChunker::new(max_tokens, overlap_tokens)?,
        })
    }

    /// Upload filename for the markdown body, derived from the document's
    /// filename with the extension rewritten to `.md`.
    fn upload_filename(metadata: &serde_json::Map<String, Value>) -> String {
        let filename = metadata
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or("document.md");
        if filename.ends_with(".md") {
            filename.to_string()
        } else {
            match filename.rsplit_once('.') {
                Some((stem, _)) => format!("{}.md", stem),
                None => format!("{}.md", filename),
            }
        }
    }

    async fn chunk_via_docling(
        &self,
        text: &str,
        metadata: &serde_json::Map<String, Value>,
    ) -> Result<Vec<Chunk>> {
        let part = reqwest::multipart::Part::bytes(text.as_bytes().to_vec())
            .file_name(Self::upload_filename(metadata))
            .mime_str("text/markdown")
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("files", part);

        let response = self
            .client
            .post(format!("{}/v1/chunk/hybrid/file", self.url))
            .query(&[
                ("chunking_max_tokens", self.max_tokens.to_string()),
                ("chunking_include_raw_text", "true".to_string()),
            ])
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::External(format!("docling-serve chunking request: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::External(format!("docling-serve chunking: {}", e)))?;

        let payload: HybridResponse = response
            .json()
            .await
            .map_err(|e| AppError::External(format!("docling-serve chunk payload: {}", e)))?;

        if payload.chunks.is_empty() {
            return Err(AppError::External(
                "docling-serve returned 0 chunks".to_string(),
            ));
        }

        let mut chunks = Vec::new();
        let mut output_index = 0usize;
        for item in payload.chunks {
            let content = item
                .text
                .filter(|t| !t.trim().is_empty())
                .or(item.raw_text.filter(|t| !t.trim().is_empty()));
            let Some(content) = content else {
                continue;
            };

            let index = item.chunk_index.unwrap_or(output_index);
            let mut chunk_meta = metadata.clone();
            chunk_meta.insert("chunk_index".to_string(), Value::from(index));
            chunk_meta.insert(
                "num_tokens".to_string(),
                Value::from(item.num_tokens.unwrap_or(0)),
            );
            chunk_meta.insert(
                "chunker".to_string(),
                Value::String("docling_hybrid".to_string()),
            );
            if let Some(last) = item.headings.last() {
                chunk_meta.insert(
                    "heading_context".to_string(),
                    Value::String(last.clone()),
                );
                chunk_meta.insert(
                    "headings".to_string(),
                    Value::Array(item.headings.iter().cloned().map(Value::String).collect()),
                );
            }

            chunks.push(Chunk {
                content,
                index,
                metadata: chunk_meta,
            });
            output_index += 1;
        }

        Ok(chunks)
    }
}

#[async_trait]
impl Chunker for HybridChunker {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    async fn chunk(&self, text: &str, metadata: &serde_json::Map<String, Value>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        if !self.url.is_empty() {
            match self.chunk_via_docling(text, metadata).await {
                Ok(chunks) => return chunks,
                Err(e) => {
                    tracing::warn!(error = %e, "docling-serve chunking failed, using fallback");
                }
            }
        }

        self.fallback.chunk(text, metadata).await
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Create a chunker for the configured strategy.
pub fn create_chunker(
    strategy: ChunkingStrategy,
    max_tokens: usize,
    overlap_tokens: usize,
    docling_serve_url: &str,
    docling_serve_timeout: u64,
) -> Result<Box<dyn Chunker>> {
    match strategy {
        ChunkingStrategy::Fixed => Ok(Box::new(FixedChunker::new(max_tokens, overlap_tokens)?)),
        ChunkingStrategy::Hybrid => Ok(Box::new(HybridChunker::new(
            max_tokens,
            overlap_tokens,
            docling_serve_url,
            docling_serve_timeout,
        )?)),
    }
}

// ============================================================================
// Tests
// ============================================================================
