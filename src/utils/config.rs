//! Environment-driven configuration.
//!
//! All external-service URLs, credentials, and tuning knobs come from
//! environment variables (optionally loaded from a `.env` file by the
//! binary). Runtime overrides for a subset of these live in the settings
//! file (see [`crate::settings`]); the [`crate::container::ServiceContainer`]
//! resolves the effective value.

use std::env;

use crate::types::{AppError, Result};
use crate::utils::validate_filename_template;

/// Default canonical-filename template applied to merged metadata.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{date} - {organization} - {title}";

/// Static configuration loaded once at process start.
#[derive(Debug, Clone)]
pub struct Config {
    // Vector database
    pub database_url: String,
    pub pgvector_view_name: String,
    pub pgvector_drop_on_mismatch: bool,

    // Embedding service
    pub embedding_backend: String,
    pub embedding_model: String,
    pub embedding_url: String,
    pub embedding_api_key: String,
    pub embedding_dimensions: u32,
    pub embedding_timeout: u64,

    // LLM service (URL falls back to embedding_url when empty)
    pub llm_backend: String,
    pub llm_model: String,
    pub llm_url: String,
    pub llm_api_key: String,
    pub llm_timeout: u64,

    // Document services
    pub docling_serve_url: String,
    pub docling_serve_timeout: u64,
    pub tika_server_url: String,
    pub tika_timeout: u64,
    pub gotenberg_url: String,
    pub gotenberg_timeout: u64,

    // Archive
    pub paperless_url: String,
    pub paperless_token: String,
    pub verify_timeout: u64,

    // Backend selection
    pub parser_backend: String,
    pub archive_backend: String,
    pub rag_backend: String,

    // Chunking
    pub chunking_strategy: String,
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,

    // Pipeline behavior
    pub metadata_merge_strategy: String,
    pub filename_template: String,
    pub metadata_enrichment_enabled: bool,
    pub llm_enrichment_enabled: bool,
    pub llm_enrichment_max_tokens: usize,
    pub contextual_enrichment_enabled: bool,
    pub contextual_enrichment_window: usize,

    // Local state
    pub state_dir: String,
    pub settings_file: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Every variable has a default; only structurally invalid values
    /// (an unparseable filename template) are an error here. Missing
    /// URLs/credentials surface later as "not configured" at the backend
    /// that needs them.
    pub fn from_env() -> Result<Self> {
        let config = Config {
            database_url: env_str("DATABASE_URL", ""),
            pgvector_view_name: env_str("PGVECTOR_VIEW_NAME", "anythingllm_document_view"),
            pgvector_drop_on_mismatch: env_bool("PGVECTOR_DROP_ON_MISMATCH", false),

            embedding_backend: env_str("EMBEDDING_BACKEND", "ollama"),
            embedding_model: env_str("EMBEDDING_MODEL", "nomic-embed-text"),
            embedding_url: env_str("EMBEDDING_URL", ""),
            embedding_api_key: env_str("EMBEDDING_API_KEY", ""),
            embedding_dimensions: env_u32("EMBEDDING_DIMENSIONS", 768),
            embedding_timeout: env_u64("EMBEDDING_TIMEOUT", 60),

            llm_backend: env_str("LLM_BACKEND", "ollama"),
            llm_model: env_str("LLM_MODEL", "llama3.1:8b"),
            llm_url: env_str("LLM_URL", ""),
            llm_api_key: env_str("LLM_API_KEY", ""),
            llm_timeout: env_u64("LLM_TIMEOUT", 120),

            docling_serve_url: env_str("DOCLING_SERVE_URL", ""),
            docling_serve_timeout: env_u64("DOCLING_SERVE_TIMEOUT", 120),
            tika_server_url: env_str("TIKA_SERVER_URL", ""),
            tika_timeout: env_u64("TIKA_TIMEOUT", 120),
            gotenberg_url: env_str("GOTENBERG_URL", ""),
            gotenberg_timeout: env_u64("GOTENBERG_TIMEOUT", 60),

            paperless_url: env_str("PAPERLESS_URL", ""),
            paperless_token: env_str("PAPERLESS_TOKEN", ""),
            verify_timeout: env_u64("VERIFY_TIMEOUT", 60),

            parser_backend: env_str("PARSER_BACKEND", "docling_serve"),
            archive_backend: env_str("ARCHIVE_BACKEND", "paperless"),
            rag_backend: env_str("RAG_BACKEND", "vector"),

            chunking_strategy: env_str("CHUNKING_STRATEGY", "hybrid"),
            chunk_max_tokens: env_usize("CHUNK_MAX_TOKENS", 512),
            chunk_overlap_tokens: env_usize("CHUNK_OVERLAP_TOKENS", 64),

            metadata_merge_strategy: env_str("METADATA_MERGE_STRATEGY", "smart"),
            filename_template: env_str("FILENAME_TEMPLATE", DEFAULT_FILENAME_TEMPLATE),
            metadata_enrichment_enabled: env_bool("METADATA_ENRICHMENT_ENABLED", true),
            llm_enrichment_enabled: env_bool("LLM_ENRICHMENT_ENABLED", false),
            llm_enrichment_max_tokens: env_usize("LLM_ENRICHMENT_MAX_TOKENS", 8000),
            contextual_enrichment_enabled: env_bool("CONTEXTUAL_ENRICHMENT_ENABLED", false),
            contextual_enrichment_window: env_usize("CONTEXTUAL_ENRICHMENT_WINDOW", 3),

            state_dir: env_str("STATE_DIR", "./data/state"),
            settings_file: env_str("SETTINGS_FILE", "./data/settings.json"),
        };

        validate_filename_template(&config.filename_template).map_err(|e| {
            AppError::Configuration(format!(
                "FILENAME_TEMPLATE is invalid: {}",
                e
            ))
        })?;

        Ok(config)
    }
}

fn env_str(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // Env vars are process-global; only assert on keys the test suite
        // never sets.
        let config = Config::from_env().unwrap();
        assert_eq!(config.chunk_max_tokens, 512);
        assert_eq!(config.chunk_overlap_tokens, 64);
        assert_eq!(config.metadata_merge_strategy, "smart");
        assert_eq!(config.parser_backend, "docling_serve");
    }
}
