//! Runtime-configurable settings.
//!
//! Settings live in a JSON file next to the application data and override a
//! subset of the environment configuration without a restart. The file is
//! deserialized into typed sections with `deny_unknown_fields`, so an
//! unknown key or a mistyped value fails validation. A file that fails to
//! load falls back to baked-in defaults; a save never writes an invalid
//! document to disk.
//!
//! Empty string means "inherit from config"; a zero timeout means the same.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{AppError, Result};

/// Pipeline behavior overrides. Empty string = inherit from config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    pub metadata_merge_strategy: String,
    pub filename_template: String,
    pub parser_backend: String,
    pub archive_backend: String,
    pub rag_backend: String,
    /// "" = inherit, otherwise "true"/"false".
    pub contextual_enrichment_enabled: String,
}

/// Per-service URL/timeout overrides. Empty URL or zero timeout = inherit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSettings {
    pub docling_serve_url: String,
    pub docling_serve_timeout: u64,
    pub tika_url: String,
    pub tika_timeout: u64,
    pub gotenberg_url: String,
    pub gotenberg_timeout: u64,
    pub paperless_url: String,
    pub paperless_timeout: u64,
    pub embedding_url: String,
    pub embedding_timeout: u64,
    pub llm_url: String,
    pub llm_timeout: u64,
}

/// Per-scraper toggles and RAG overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScraperSettings {
    pub cloudflare_enabled: bool,
    pub ingestion_mode: String,
    pub dataset_id: String,
    pub embedding_model: String,
    pub chunk_method: String,
    pub pdf_parser: String,
    pub pipeline_id: String,
}

/// The full settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub pipeline: PipelineSettings,
    pub services: ServiceSettings,
    pub scrapers: BTreeMap<String, ScraperSettings>,
}

impl Settings {
    /// Range checks serde cannot express. A settings document must pass
    /// here before it is written to disk.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("docling_serve_timeout", self.services.docling_serve_timeout),
            ("tika_timeout", self.services.tika_timeout),
            ("gotenberg_timeout", self.services.gotenberg_timeout),
            ("paperless_timeout", self.services.paperless_timeout),
            ("embedding_timeout", self.services.embedding_timeout),
            ("llm_timeout", self.services.llm_timeout),
        ];
        for (name, value) in timeouts {
            if value > 600 {
                return Err(AppError::InvalidInput(format!(
                    "services.{} must be <= 600 seconds, got {}",
                    name, value
                )));
            }
        }
        match self.pipeline.contextual_enrichment_enabled.as_str() {
            "" | "true" | "false" => {}
            other => {
                return Err(AppError::InvalidInput(format!(
                    "pipeline.contextual_enrichment_enabled must be \"\", \"true\" or \"false\", got {:?}",
                    other
                )))
            }
        }
        Ok(())
    }
}

/// Loads, caches, and persists the settings document.
pub struct SettingsManager {
    path: PathBuf,
    settings: parking_lot::RwLock<Settings>,
}

impl SettingsManager {
    /// Load settings from `path`. A missing, unreadable, or invalid file
    /// yields defaults (the failure is logged, never fatal).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = Self::read_file(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to load settings, using defaults");
            Settings::default()
        });
        Self {
            path,
            settings: parking_lot::RwLock::new(settings),
        }
    }

    fn read_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Internal(format!("read {}: {}", path.display(), e)))?;
        let settings: Settings = serde_json::from_str(&raw)
            .map_err(|e| AppError::InvalidInput(format!("settings validation failed: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Snapshot of the current settings.
    pub fn current(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Replace the settings and persist. An invalid document errors out
    /// without touching disk or the in-memory copy.
    pub fn save(&self, new_settings: Settings) -> Result<()> {
        new_settings.validate()?;
        let rendered = serde_json::to_string_pretty(&new_settings)
            .map_err(|e| AppError::Internal(format!("serialize settings: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Internal(format!("create {}: {}", parent.display(), e)))?;
        }
        std::fs::write(&self.path, rendered)
            .map_err(|e| AppError::Internal(format!("write {}: {}", self.path.display(), e)))?;
        *self.settings.write() = new_settings;
        Ok(())
    }

    // ----- override accessors used by the container -----

    /// Pipeline override by key; empty string when not overridden.
    pub fn pipeline_override(&self, key: &str) -> String {
        let settings = self.settings.read();
        match key {
            "metadata_merge_strategy" => settings.pipeline.metadata_merge_strategy.clone(),
            "filename_template" => settings.pipeline.filename_template.clone(),
            "parser_backend" => settings.pipeline.parser_backend.clone(),
            "archive_backend" => settings.pipeline.archive_backend.clone(),
            "rag_backend" => settings.pipeline.rag_backend.clone(),
            "contextual_enrichment_enabled" => {
                settings.pipeline.contextual_enrichment_enabled.clone()
            }
            _ => String::new(),
        }
    }

    /// Service URL override; empty string when not overridden.
    pub fn service_url(&self, service: &str) -> String {
        let s = self.settings.read();
        match service {
            "docling_serve" => s.services.docling_serve_url.clone(),
            "tika" => s.services.tika_url.clone(),
            "gotenberg" => s.services.gotenberg_url.clone(),
            "paperless" => s.services.paperless_url.clone(),
            "embedding" => s.services.embedding_url.clone(),
            "llm" => s.services.llm_url.clone(),
            _ => String::new(),
        }
    }

    /// Service timeout override; zero when not overridden.
    pub fn service_timeout(&self, service: &str) -> u64 {
        let s = self.settings.read();
        match service {
            "docling_serve" => s.services.docling_serve_timeout,
            "tika" => s.services.tika_timeout,
            "gotenberg" => s.services.gotenberg_timeout,
            "paperless" => s.services.paperless_timeout,
            "embedding" => s.services.embedding_timeout,
            "llm" => s.services.llm_timeout,
            _ => 0,
        }
    }

    /// Per-scraper settings, default when the scraper has no section.
    pub fn scraper(&self, name: &str) -> ScraperSettings {
        self.settings
            .read()
            .scrapers
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
