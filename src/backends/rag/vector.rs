//! Vector-store RAG backend.
//!
//! Chunks a content file, optionally enriches chunk text with situating
//! paragraphs, embeds, and persists through any [`VectorStore`]. Enriched
//! text is used for embedding ONLY — the raw chunk content is what gets
//! stored.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::backends::{RagBackend, RagDocument};
use crate::chunking::Chunker;
use crate::embedding::EmbeddingClient;
use crate::enrichment::DocumentEnrichmentService;
use crate::types::{RagOutcome, Result};
use crate::vectorstore::{ChunkRecord, VectorStore};

/// RAG backend composing chunker + embedder + vector store.
pub struct VectorRagBackend {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    chunker: Box<dyn Chunker>,
    /// Tier-2 contextual enrichment, present only when enabled and the LLM
    /// is configured.
    enrichment: Option<Arc<DocumentEnrichmentService>>,
    enrichment_window: usize,
}

impl VectorRagBackend {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        chunker: Box<dyn Chunker>,
        enrichment: Option<Arc<DocumentEnrichmentService>>,
        enrichment_window: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker,
            enrichment,
            enrichment_window,
        }
    }

    fn failure(&self, error: impl Into<String>) -> RagOutcome {
        RagOutcome::Failure {
            error: error.into(),
            rag_name: self.name(),
        }
    }

    /// Texts used for embedding: enriched when the service is present,
    /// raw chunk content otherwise or on any enrichment shortfall.
    async fn embedding_texts(
        &self,
        chunks: &[crate::types::Chunk],
        full_text: &str,
    ) -> Vec<String> {
        let raw = || chunks.iter().map(|c| c.content.clone()).collect::<Vec<_>>();

        let Some(service) = &self.enrichment else {
            return raw();
        };

        let enriched = service
            .enrich_chunks(chunks, full_text, self.enrichment_window)
            .await;
        if enriched.len() != chunks.len() {
            tracing::warn!(
                enriched = enriched.len(),
                chunks = chunks.len(),
                "enrichment count mismatch, using raw content"
            );
            return raw();
        }
        enriched
    }
}

#[async_trait]
impl RagBackend for VectorRagBackend {
    fn name(&self) -> String {
        format!("vector:{}", self.store.name())
    }

    fn is_configured(&self) -> bool {
        self.store.is_configured() && self.embedder.is_configured()
    }

    /// Availability probes both the store and the embedder, not just the
    /// configuration.
    async fn is_available(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        self.store.test_connection().await && self.embedder.test_connection().await
    }

    async fn test_connection(&self) -> bool {
        self.is_available().await
    }

    async fn ingest(
        &self,
        content_path: &Path,
        metadata: &serde_json::Map<String, Value>,
        collection_id: Option<&str>,
    ) -> RagOutcome {
        if !self.is_configured() {
            return self.failure(format!(
                "{} backend not configured (missing vector store or embedding URL)",
                self.name()
            ));
        }
        if !content_path.exists() {
            return self.failure(format!("Content file not found: {}", content_path.display()));
        }

        // Partition key: explicit collection > metadata source > default.
        let source = collection_id
            .map(str::to_string)
            .or_else(|| {
                metadata
                    .get("source")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "default".to_string());
        let filename = content_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let text = match tokio::fs::read_to_string(content_path).await {
            Ok(text) => text,
            Err(e) => {
                return self.failure(format!("read {}: {}", content_path.display(), e));
            }
        };
        if text.trim().is_empty() {
            return self.failure(format!("Content file is empty: {}", content_path.display()));
        }

        let chunks = self.chunker.chunk(&text, metadata).await;
        if chunks.is_empty() {
            return self.failure(format!("No chunks produced from: {}", content_path.display()));
        }

        let texts = self.embedding_texts(&chunks, &text).await;

        let embedding_result = match self.embedder.embed(&texts).await {
            Ok(result) => result,
            Err(e) => return self.failure(format!("{} ingestion failed: {}", self.name(), e)),
        };
        if embedding_result.embeddings.is_empty() {
            return self.failure(format!("Embedding failed for: {}", content_path.display()));
        }
        if embedding_result.embeddings.len() != chunks.len() {
            return self.failure(format!(
                "Embedding count mismatch: got {}, expected {}",
                embedding_result.embeddings.len(),
                chunks.len()
            ));
        }

        // Raw chunk content is persisted even when enriched text was
        // embedded.
        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(embedding_result.embeddings)
            .map(|(chunk, embedding)| ChunkRecord {
                content: chunk.content.clone(),
                embedding,
                chunk_index: chunk.index as i32,
                metadata: chunk.metadata.clone(),
            })
            .collect();

        let document_id = metadata
            .get("document_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Err(e) = self.store.ensure_ready().await {
            return self.failure(format!("{} ingestion failed: {}", self.name(), e));
        }
        let count = match self
            .store
            .store(&source, &filename, &records, document_id.as_deref())
            .await
        {
            Ok(count) => count,
            Err(e) => return self.failure(format!("{} ingestion failed: {}", self.name(), e)),
        };

        tracing::info!(
            source,
            filename,
            count,
            model = %embedding_result.model,
            dims = embedding_result.dimensions,
            "ingested chunks"
        );

        RagOutcome::Success {
            document_id: document_id.unwrap_or(filename),
            collection_id: Some(source),
            rag_name: self.name(),
        }
    }

    async fn list_documents(&self, collection_id: Option<&str>) -> Result<Vec<RagDocument>> {
        let sources = match collection_id {
            Some(source) => {
                let chunks = self.store.get_sources().await?;
                chunks
                    .into_iter()
                    .filter(|s| s.source == source)
                    .collect::<Vec<_>>()
            }
            None => self.store.get_sources().await?,
        };
        Ok(sources
            .into_iter()
            .map(|s| RagDocument {
                id: s.source.clone(),
                name: Some(format!("{} ({} chunks)", s.source, s.chunk_count)),
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
