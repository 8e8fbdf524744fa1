//! Vector store abstraction.
//!
//! This module provides the contract for partitioned vector persistence
//! consumed by the RAG adapter, plus the pgvector implementation. The store
//! owns its rows; callers reference documents only by `(source, filename)`.

pub mod pgvector;
mod view;

pub use pgvector::PgVectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Result, SearchHit, StoredChunk};

/// One chunk ready for persistence: raw content plus its embedding.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: i32,
    pub metadata: serde_json::Map<String, Value>,
}

/// A source with its chunk count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCount {
    pub source: String,
    pub chunk_count: i64,
}

/// Overall store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_chunks: i64,
    pub total_documents: i64,
    pub total_sources: i64,
}

/// Abstract contract for partitioned vector storage.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Whether the store has the configuration it needs to connect.
    fn is_configured(&self) -> bool;

    /// Probe connectivity (and any required extensions).
    async fn test_connection(&self) -> bool;

    /// Idempotent schema bootstrap. Safe to call on every ingest.
    async fn ensure_ready(&self) -> Result<()>;

    /// Replace a document's chunks atomically: delete all rows for
    /// `(source, filename)` then batch-insert `chunks`. When `document_id`
    /// is supplied it is injected into each row's metadata. Returns the
    /// number of rows written.
    async fn store(
        &self,
        source: &str,
        filename: &str,
        chunks: &[ChunkRecord],
        document_id: Option<&str>,
    ) -> Result<u64>;

    /// Delete all chunks for a document. Returns the number deleted.
    async fn delete_document(&self, source: &str, filename: &str) -> Result<u64>;

    /// Cosine-similarity search. `limit` must be in `[1, 1000]`.
    async fn search(
        &self,
        query_embedding: &[f32],
        sources: Option<&[String]>,
        metadata_filter: Option<&Value>,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    /// List all sources with their chunk counts.
    async fn get_sources(&self) -> Result<Vec<SourceCount>>;

    /// Overall statistics.
    async fn get_stats(&self) -> Result<StoreStats>;

    /// All chunks for one document in `chunk_index` order.
    async fn get_document_chunks(&self, source: &str, filename: &str) -> Result<Vec<StoredChunk>>;

    /// Close connections and release resources.
    async fn close(&self);
}
