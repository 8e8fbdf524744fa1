//! PostgreSQL + pgvector vector store.
//!
//! Manages schema creation, chunk storage, and cosine-similarity search
//! using one list-partition per `source` (usually the scraper name), each
//! with a dedicated HNSW index for approximate nearest-neighbor search.
//!
//! Schema evolution is dimension-safe: a table whose `embedding` column
//! disagrees with the configured dimensionality is recreated automatically
//! when empty, destructively only behind an explicit opt-in flag.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Acquire, PgPool, Row};
use tracing::{debug, info, warn};

use super::view::compat_view_sql;
use super::{ChunkRecord, SourceCount, StoreStats, VectorStore};
use crate::types::{AppError, Result, SearchHit, StoredChunk};

const PARENT_TABLE: &str = "document_chunks";

/// Vector store backed by PostgreSQL with the pgvector extension.
pub struct PgVectorStore {
    database_url: String,
    dimensions: u32,
    view_name: String,
    drop_on_mismatch: bool,
    pool: tokio::sync::Mutex<Option<PgPool>>,
    schema_lock: tokio::sync::Mutex<()>,
    partition_lock: tokio::sync::Mutex<()>,
    known_partitions: parking_lot::RwLock<HashSet<String>>,
    schema_ensured: AtomicBool,
}

/// Validate a source name for use as a partition key: alphanumeric,
/// underscore, and hyphen only.
pub(crate) fn validate_source_name(source: &str) -> Result<()> {
    let valid = !source.is_empty()
        && source
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(AppError::InvalidInput(format!(
            "Invalid source name: {:?}. Only alphanumeric, underscore, and hyphen allowed.",
            source
        )));
    }
    Ok(())
}

/// The actionable error raised when the existing table's dimensionality
/// disagrees with the configuration and the table holds data.
pub(crate) fn dimension_mismatch_error(existing: i32, configured: u32, rows: i64) -> AppError {
    AppError::Configuration(format!(
        "Embedding dimension mismatch: existing table has vector({}), but \
         EMBEDDING_DIMENSIONS is configured as {}. The table contains {} row(s) \
         which are incompatible with the new model. To drop all data and recreate, \
         set the environment variable PGVECTOR_DROP_ON_MISMATCH=true and restart.",
        existing, configured, rows
    ))
}

/// Render a vector as a pgvector literal for a `$n::vector` bind.
fn vector_literal(embedding: &[f32]) -> String {
    let joined = embedding
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", joined)
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::Database(e.to_string())
}

impl PgVectorStore {
    /// Create a store. `dimensions` must be positive; the connection pool
    /// is created lazily on first use.
    pub fn new(
        database_url: &str,
        dimensions: u32,
        view_name: &str,
        drop_on_mismatch: bool,
    ) -> Result<Self> {
        if dimensions < 1 {
            return Err(AppError::Configuration(format!(
                "dimensions must be a positive integer, got {}",
                dimensions
            )));
        }
        Ok(Self {
            database_url: database_url.to_string(),
            dimensions,
            view_name: view_name.to_string(),
            drop_on_mismatch,
            pool: tokio::sync::Mutex::new(None),
            schema_lock: tokio::sync::Mutex::new(()),
            partition_lock: tokio::sync::Mutex::new(()),
            known_partitions: parking_lot::RwLock::new(HashSet::new()),
            schema_ensured: AtomicBool::new(false),
        })
    }

    /// Get or create the connection pool (min 2 / max 10 connections).
    async fn get_pool(&self) -> Result<PgPool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }
        if self.database_url.is_empty() {
            return Err(AppError::Configuration(
                "DATABASE_URL is not configured".to_string(),
            ));
        }
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(10)
            .connect(&self.database_url)
            .await
            .map_err(db_err)?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Vector dimensionality of the existing `embedding` column, or `None`
    /// when the parent table doesn't exist. `pg_attribute.atttypmod` stores
    /// the dimension count directly for the pgvector `vector` type.
    async fn existing_dimensions(&self, pool: &PgPool) -> Result<Option<i32>> {
        let row = sqlx::query(
            r#"
            SELECT a.atttypmod
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relname = 'document_chunks'
              AND n.nspname = current_schema()
              AND a.attname = 'embedding'
              AND a.attnum > 0
            "#,
        )
        .fetch_optional(pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.get::<i32, _>(0)))
    }

    /// Resolve a dimension mismatch between the table and the config.
    /// An empty table is dropped and recreated; a populated one requires
    /// the opt-in flag, otherwise this is an actionable error.
    async fn handle_dimension_mismatch(&self, pool: &PgPool, existing: i32) -> Result<()> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM document_chunks")
            .fetch_one(pool)
            .await
            .map_err(db_err)?
            .get(0);

        if count == 0 {
            warn!(
                existing,
                configured = self.dimensions,
                "embedding dimension mismatch on empty table, dropping and recreating"
            );
        } else if self.drop_on_mismatch {
            warn!(
                existing,
                configured = self.dimensions,
                rows = count,
                "embedding dimension mismatch, PGVECTOR_DROP_ON_MISMATCH=true, dropping"
            );
        } else {
            return Err(dimension_mismatch_error(existing, self.dimensions, count));
        }

        // CASCADE removes the compatibility view and all partitions.
        sqlx::query("DROP TABLE document_chunks CASCADE")
            .execute(pool)
            .await
            .map_err(db_err)?;
        self.known_partitions.write().clear();
        Ok(())
    }

    /// Create the partition and HNSW index for a source if not yet known.
    /// Serialized under the partition lock; known partitions are memoized.
    async fn ensure_partition(&self, pool: &PgPool, source: &str) -> Result<()> {
        if self.known_partitions.read().contains(source) {
            return Ok(());
        }

        let _guard = self.partition_lock.lock().await;
        if self.known_partitions.read().contains(source) {
            return Ok(());
        }

        validate_source_name(source)?;
        let safe_source = source.replace('-', "_");
        let partition_name = format!("{}_{}", PARENT_TABLE, safe_source);
        let index_name = format!("idx_{}_embedding_hnsw", safe_source);

        let exists = sqlx::query(
            "SELECT 1 FROM pg_tables WHERE tablename = $1 AND schemaname = current_schema()",
        )
        .bind(&partition_name)
        .fetch_optional(pool)
        .await
        .map_err(db_err)?
        .is_some();

        if !exists {
            // Source is validated, safe for SQL composition.
            let create_sql = format!(
                "CREATE TABLE \"{}\" PARTITION OF {} FOR VALUES IN ('{}')",
                partition_name, PARENT_TABLE, source
            );
            sqlx::query(&create_sql).execute(pool).await.map_err(db_err)?;
            info!(source, partition = %partition_name, "created partition");
        }

        // Always ensure the index exists (handles partial-creation scenario).
        let index_sql = format!(
            "CREATE INDEX IF NOT EXISTS \"{}\" ON \"{}\" \
             USING hnsw (embedding vector_cosine_ops) \
             WITH (m = 16, ef_construction = 64)",
            index_name, partition_name
        );
        sqlx::query(&index_sql).execute(pool).await.map_err(db_err)?;

        self.known_partitions.write().insert(source.to_string());
        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn name(&self) -> &'static str {
        "pgvector"
    }

    fn is_configured(&self) -> bool {
        !self.database_url.is_empty()
    }

    async fn test_connection(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        let pool = match self.get_pool().await {
            Ok(pool) => pool,
            Err(e) => {
                debug!(error = %e, "connection test failed");
                return false;
            }
        };
        match sqlx::query("SELECT 1 FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(&pool)
            .await
        {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!("pgvector extension not installed");
                false
            }
            Err(e) => {
                debug!(error = %e, "connection test failed");
                false
            }
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.schema_ensured.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self.schema_lock.lock().await;
        if self.schema_ensured.load(Ordering::Acquire) {
            return Ok(());
        }

        let pool = self.get_pool().await?;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&pool)
            .await
            .map_err(db_err)?;

        if let Some(existing) = self.existing_dimensions(&pool).await? {
            if existing != self.dimensions as i32 {
                self.handle_dimension_mismatch(&pool, existing).await?;
            }
        }

        // Dimensions is a validated positive integer, safe for composition.
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id BIGSERIAL, \
             source TEXT NOT NULL, \
             filename TEXT NOT NULL, \
             chunk_index INTEGER NOT NULL, \
             content TEXT NOT NULL, \
             embedding vector({}), \
             metadata JSONB DEFAULT '{{}}'::jsonb, \
             created_at TIMESTAMPTZ DEFAULT NOW(), \
             PRIMARY KEY (source, id)\
             ) PARTITION BY LIST (source)",
            PARENT_TABLE, self.dimensions
        );
        sqlx::query(&create_sql).execute(&pool).await.map_err(db_err)?;

        // GIN index on metadata for filtered searches.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_document_chunks_metadata \
             ON document_chunks USING GIN (metadata)",
        )
        .execute(&pool)
        .await
        .map_err(db_err)?;

        if !self.view_name.is_empty() {
            let view_sql = compat_view_sql(&self.view_name)?;
            sqlx::query(&view_sql).execute(&pool).await.map_err(db_err)?;
        }

        self.schema_ensured.store(true, Ordering::Release);
        debug!("schema ensured (pgvector extension + parent table)");
        Ok(())
    }

    async fn store(
        &self,
        source: &str,
        filename: &str,
        chunks: &[ChunkRecord],
        document_id: Option<&str>,
    ) -> Result<u64> {
        if chunks.is_empty() {
            return Ok(0);
        }

        // Validate before touching the database.
        for (i, chunk) in chunks.iter().enumerate() {
            let mut missing = Vec::new();
            if chunk.content.is_empty() {
                missing.push("content");
            }
            if chunk.embedding.is_empty() {
                missing.push("embedding");
            }
            if !missing.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "Chunk {} missing required field(s): {}",
                    i,
                    missing.join(", ")
                )));
            }
        }

        self.ensure_ready().await?;
        let pool = self.get_pool().await?;
        self.ensure_partition(&pool, source).await?;

        let mut tx = pool.begin().await.map_err(db_err)?;
        {
            // Savepoint: an insert failure rolls the delete back too.
            let mut sp = tx.begin().await.map_err(db_err)?;

            sqlx::query("DELETE FROM document_chunks WHERE source = $1 AND filename = $2")
                .bind(source)
                .bind(filename)
                .execute(&mut *sp)
                .await
                .map_err(db_err)?;

            for chunk in chunks {
                let mut metadata = chunk.metadata.clone();
                if let Some(doc_id) = document_id {
                    metadata.insert(
                        "document_id".to_string(),
                        Value::String(doc_id.to_string()),
                    );
                }

                sqlx::query(
                    "INSERT INTO document_chunks \
                     (source, filename, chunk_index, content, embedding, metadata) \
                     VALUES ($1, $2, $3, $4, $5::vector, $6)",
                )
                .bind(source)
                .bind(filename)
                .bind(chunk.chunk_index)
                .bind(&chunk.content)
                .bind(vector_literal(&chunk.embedding))
                .bind(Value::Object(metadata))
                .execute(&mut *sp)
                .await
                .map_err(db_err)?;
            }

            sp.commit().await.map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        debug!(source, filename, count = chunks.len(), "stored chunks");
        Ok(chunks.len() as u64)
    }

    async fn delete_document(&self, source: &str, filename: &str) -> Result<u64> {
        let pool = self.get_pool().await?;
        let result = sqlx::query("DELETE FROM document_chunks WHERE source = $1 AND filename = $2")
            .bind(source)
            .bind(filename)
            .execute(&pool)
            .await
            .map_err(db_err)?;
        let deleted = result.rows_affected();
        debug!(source, filename, deleted, "deleted document chunks");
        Ok(deleted)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        sources: Option<&[String]>,
        metadata_filter: Option<&Value>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if !(1..=1000).contains(&limit) {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and 1000, got {}",
                limit
            )));
        }

        let pool = self.get_pool().await?;
        let query_literal = vector_literal(query_embedding);

        let mut conditions: Vec<String> = Vec::new();
        let mut next_param = 2;
        let source_param = sources.filter(|s| !s.is_empty()).map(|s| {
            conditions.push(format!("source = ANY(${})", next_param));
            next_param += 1;
            s.to_vec()
        });
        let filter_param = metadata_filter.map(|f| {
            conditions.push(format!("metadata @> ${}", next_param));
            next_param += 1;
            f.clone()
        });

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT source, filename, chunk_index, content, metadata, \
             1 - (embedding <=> $1::vector) AS score \
             FROM document_chunks \
             {} \
             ORDER BY embedding <=> $1::vector \
             LIMIT ${}",
            where_clause, next_param
        );

        let mut query = sqlx::query(&sql).bind(&query_literal);
        if let Some(sources) = source_param {
            query = query.bind(sources);
        }
        if let Some(filter) = filter_param {
            query = query.bind(filter);
        }
        query = query.bind(limit as i64);

        let rows = query.fetch_all(&pool).await.map_err(db_err)?;

        let hits = rows
            .into_iter()
            .map(|row| {
                let metadata: Value = row.get("metadata");
                SearchHit {
                    source: row.get("source"),
                    filename: row.get("filename"),
                    chunk_index: row.get("chunk_index"),
                    content: row.get("content"),
                    metadata: metadata.as_object().cloned().unwrap_or_default(),
                    score: row.get("score"),
                }
            })
            .collect();

        Ok(hits)
    }

    async fn get_sources(&self) -> Result<Vec<SourceCount>> {
        let pool = self.get_pool().await?;
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS chunk_count \
             FROM document_chunks GROUP BY source ORDER BY source",
        )
        .fetch_all(&pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| SourceCount {
                source: row.get("source"),
                chunk_count: row.get("chunk_count"),
            })
            .collect())
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let pool = self.get_pool().await?;
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_chunks, \
             COUNT(DISTINCT (source, filename)) AS total_documents, \
             COUNT(DISTINCT source) AS total_sources \
             FROM document_chunks",
        )
        .fetch_one(&pool)
        .await
        .map_err(db_err)?;

        Ok(StoreStats {
            total_chunks: row.get("total_chunks"),
            total_documents: row.get("total_documents"),
            total_sources: row.get("total_sources"),
        })
    }

    async fn get_document_chunks(&self, source: &str, filename: &str) -> Result<Vec<StoredChunk>> {
        let pool = self.get_pool().await?;
        let rows = sqlx::query(
            "SELECT chunk_index, content, metadata \
             FROM document_chunks \
             WHERE source = $1 AND filename = $2 \
             ORDER BY chunk_index",
        )
        .bind(source)
        .bind(filename)
        .fetch_all(&pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let metadata: Value = row.get("metadata");
                StoredChunk {
                    chunk_index: row.get("chunk_index"),
                    content: row.get("content"),
                    metadata: metadata.as_object().cloned().unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn close(&self) {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.take() {
            pool.close().await;
            self.schema_ensured.store(false, Ordering::Release);
            self.known_partitions.write().clear();
            debug!("connection pool closed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
