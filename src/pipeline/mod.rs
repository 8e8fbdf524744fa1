//! Pipeline orchestration: the per-document state machine.
//!
//! For each scraped document the pipeline routes the format to the right
//! extraction path, enriches metadata, archives a human-readable artifact,
//! verifies it, ingests the content into RAG, and cleans up local files.
//! Parser and archive failures are fatal for the document (it counts as
//! failed and processing moves on); verification timeouts and RAG failures
//! are recorded but non-fatal.

pub mod merge;
mod streaming;

pub use merge::{merge_metadata, MergeStrategy};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::backends::{ArchiveBackend, ParserBackend, RagBackend};
use crate::clients::{RendererClient, TikaClient};
use crate::container::ServiceContainer;
use crate::enrichment::DocumentEnrichmentService;
use crate::state::StateTracker;
use crate::types::{AppError, DocumentMetadata, ParserOutcome, Result};
use crate::utils::generate_filename_from_template;

/// The closed document-type set tier-1 enrichment may assign.
const DOCUMENT_TYPES: &[&str] = &[
    "report",
    "policy",
    "guideline",
    "regulation",
    "legislation",
    "standard",
    "manual",
    "briefing",
    "correspondence",
    "media_release",
    "submission",
    "other",
];

// ============================================================================
// Format Routing
// ============================================================================

/// Document format classes driving extraction and archive routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Pdf,
    Markdown,
    Html,
    Office,
    Other,
}

impl DocFormat {
    /// Classify by file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Self::Pdf,
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "odp" | "rtf" => {
                Self::Office
            }
            _ => Self::Other,
        }
    }
}

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// Options for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub scraper_name: String,
    pub dataset_id: Option<String>,
    pub max_pages: Option<u32>,
    pub upload_to_archive: bool,
    pub upload_to_rag: bool,
    pub verify_timeout: u64,
}

impl PipelineOptions {
    pub fn new(scraper_name: impl Into<String>) -> Self {
        Self {
            scraper_name: scraper_name.into(),
            dataset_id: None,
            max_pages: None,
            upload_to_archive: true,
            upload_to_rag: true,
            verify_timeout: 60,
        }
    }
}

/// Resolved collaborators for a pipeline run. Built from the service
/// container in production; constructed directly in tests.
#[derive(Default)]
pub struct PipelineServices {
    pub parser: Option<Arc<dyn ParserBackend>>,
    pub archive: Option<Arc<dyn ArchiveBackend>>,
    pub rag: Option<Arc<dyn RagBackend>>,
    pub tika: Option<Arc<TikaClient>>,
    pub renderer: Option<Arc<RendererClient>>,
    /// Tier-1 document enrichment, present only when enabled.
    pub enrichment: Option<Arc<DocumentEnrichmentService>>,
    pub state_tracker: Option<Arc<StateTracker>>,
}

/// Per-document outcome flags, committed into the run counters only after
/// the state machine returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocOutcome {
    pub parsed: bool,
    pub archived: bool,
    pub verified: bool,
    pub rag_indexed: bool,
}

/// The per-run orchestrator.
pub struct Pipeline {
    options: PipelineOptions,
    services: PipelineServices,
    dataset_id: String,
    merge_strategy: MergeStrategy,
    filename_template: String,
    metadata_enrichment_enabled: bool,
}

impl Pipeline {
    /// Assemble a pipeline from explicit parts. The merge strategy and
    /// filename template are validated here, before any work starts.
    pub fn new(
        options: PipelineOptions,
        services: PipelineServices,
        merge_strategy: &str,
        filename_template: &str,
        metadata_enrichment_enabled: bool,
    ) -> Result<Self> {
        let merge_strategy: MergeStrategy = merge_strategy.parse()?;
        crate::utils::validate_filename_template(filename_template)?;

        // Collection defaults to the scraper name (collection == source for
        // the vector RAG flavor).
        let dataset_id = options
            .dataset_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| options.scraper_name.clone());

        Ok(Self {
            options,
            services,
            dataset_id,
            merge_strategy,
            filename_template: filename_template.to_string(),
            metadata_enrichment_enabled,
        })
    }

    /// Resolve every collaborator through the service container.
    pub async fn from_container(
        container: &ServiceContainer,
        mut options: PipelineOptions,
    ) -> Result<Self> {
        let config = container.config();

        if options.dataset_id.is_none() {
            let scraper_dataset = container.settings().scraper(&options.scraper_name).dataset_id;
            if !scraper_dataset.is_empty() {
                options.dataset_id = Some(scraper_dataset);
            }
        }

        let parser = Some(container.parser_backend().await?);
        let archive = if options.upload_to_archive {
            Some(container.archive_backend().await?)
        } else {
            None
        };
        let rag = if options.upload_to_rag {
            Some(container.rag_backend().await?)
        } else {
            None
        };

        let enrichment = if config.llm_enrichment_enabled {
            let llm = container.llm_client()?;
            if llm.is_configured() {
                Some(Arc::new(DocumentEnrichmentService::new(
                    llm,
                    config.llm_enrichment_max_tokens,
                )))
            } else {
                None
            }
        } else {
            None
        };

        let services = PipelineServices {
            parser,
            archive,
            rag,
            tika: Some(container.tika_client()),
            renderer: Some(container.renderer_client()),
            enrichment,
            state_tracker: Some(container.state_tracker(&options.scraper_name)),
        };

        let merge_strategy = container.effective_merge_strategy();
        let filename_template = container.effective_filename_template();
        let metadata_enrichment_enabled = config.metadata_enrichment_enabled;

        Self::new(
            options,
            services,
            &merge_strategy,
            &filename_template,
            metadata_enrichment_enabled,
        )
    }

    pub fn scraper_name(&self) -> &str {
        &self.options.scraper_name
    }

    fn record_step(timings: &mut BTreeMap<String, f64>, step: &str, started: Instant) {
        *timings.entry(step.to_string()).or_insert(0.0) += started.elapsed().as_secs_f64();
    }

    // ------------------------------------------------------------------
    // Per-document state machine
    // ------------------------------------------------------------------

    /// Run one document through the ordered steps. Fatal errors (parser,
    /// archive) return `Err`; everything else is reflected in the outcome
    /// flags.
    pub(crate) async fn process_document(
        &self,
        mut doc: DocumentMetadata,
        path: &Path,
        timings: &mut BTreeMap<String, f64>,
    ) -> Result<DocOutcome> {
        let mut outcome = DocOutcome::default();
        let format = DocFormat::from_path(path);

        // Step 1: content extraction (format routing).
        let started = Instant::now();
        let (content_path, mut parser_metadata) = self.extract_content(path, &doc, format).await?;
        Self::record_step(timings, "parse", started);
        outcome.parsed = true;

        // Step 2: parser-metadata enrichment via Tika (fill missing keys).
        if self.metadata_enrichment_enabled && format != DocFormat::Office {
            let started = Instant::now();
            self.enrich_parser_metadata(path, &mut parser_metadata).await;
            Self::record_step(timings, "enrich", started);
        }

        // Step 3: tier-1 LLM enrichment (fill gaps only).
        if let Some(service) = &self.services.enrichment {
            let started = Instant::now();
            if let Some(llm_metadata) = service.enrich_metadata(&content_path).await {
                Self::apply_tier1(&mut doc, &parser_metadata, &llm_metadata);
            }
            Self::record_step(timings, "enrich", started);
        }

        // Step 4: metadata merge.
        let merged = merge_metadata(&doc, &parser_metadata, self.merge_strategy);

        // Step 5: canonical filename.
        let canonical_name =
            generate_filename_from_template(&self.filename_template, &merged).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "filename template failed, using original name");
                merged.filename.clone()
            });
        tracing::debug!(canonical = %canonical_name, "canonical filename");

        // Step 6: prepare the archive artifact (render to PDF when needed).
        let started = Instant::now();
        let (artifact_path, generated_pdf) = self.prepare_archive_file(path, format).await;
        Self::record_step(timings, "render", started);

        // Steps 7-8: archive + verify.
        if let Some(archive) = &self.services.archive {
            let started = Instant::now();
            tracing::info!(name = %canonical_name, "archiving document");
            let archive_outcome = archive
                .archive(
                    &artifact_path,
                    &merged.title,
                    Some(&merged.publication_date).filter(|d| !d.is_empty()).map(String::as_str),
                    Some(&merged.organization).filter(|o| !o.is_empty()).map(String::as_str),
                    &merged.tags,
                    &merged.to_map(),
                )
                .await;
            Self::record_step(timings, "archive", started);

            let document_id = match archive_outcome {
                crate::types::ArchiveOutcome::Success { document_id, .. } => document_id,
                crate::types::ArchiveOutcome::Failure { error, .. } => {
                    return Err(AppError::Archive(error));
                }
            };
            outcome.archived = true;
            tracing::info!(document_id = %document_id, "archive successful");

            let started = Instant::now();
            outcome.verified = archive.verify(&document_id, self.options.verify_timeout).await;
            Self::record_step(timings, "verify", started);
            if outcome.verified {
                tracing::info!(document_id = %document_id, "document verified");
            } else {
                tracing::warn!(document_id = %document_id, "document verification timed out");
            }
        }

        // Step 9: RAG ingest (non-fatal).
        if let Some(rag) = &self.services.rag {
            let started = Instant::now();
            let mut rag_metadata = merged.to_map();
            rag_metadata
                .entry("source".to_string())
                .or_insert_with(|| Value::String(self.options.scraper_name.clone()));

            let rag_outcome = rag
                .ingest(&content_path, &rag_metadata, Some(&self.dataset_id))
                .await;
            Self::record_step(timings, "rag", started);

            match rag_outcome {
                crate::types::RagOutcome::Success { document_id, .. } => {
                    outcome.rag_indexed = true;
                    tracing::info!(document_id = %document_id, "RAG ingestion successful");
                }
                crate::types::RagOutcome::Failure { error, .. } => {
                    tracing::error!(error = %error, "RAG ingestion failed");
                }
            }
        }

        // Step 10: cleanup.
        let started = Instant::now();
        self.cleanup(path, &content_path, generated_pdf.as_deref(), outcome);
        Self::record_step(timings, "cleanup", started);

        Ok(outcome)
    }

    /// Format routing for content extraction. Returns the canonical text
    /// path plus parser-extracted metadata.
    async fn extract_content(
        &self,
        path: &Path,
        doc: &DocumentMetadata,
        format: DocFormat,
    ) -> Result<(PathBuf, serde_json::Map<String, Value>)> {
        match format {
            // Markdown is already canonical text.
            DocFormat::Markdown => Ok((path.to_path_buf(), serde_json::Map::new())),

            DocFormat::Pdf | DocFormat::Html | DocFormat::Other => {
                let parser = self.services.parser.as_ref().ok_or_else(|| {
                    AppError::Parser("parser backend not configured".to_string())
                })?;
                tracing::info!(file = %path.display(), "parsing document");
                match parser.parse(path, doc).await {
                    ParserOutcome::Success {
                        content_path,
                        metadata,
                        parser_name,
                    } => {
                        tracing::info!(
                            content = %content_path.display(),
                            parser = %parser_name,
                            "parse successful"
                        );
                        Ok((content_path, metadata))
                    }
                    ParserOutcome::Failure { error, .. } => Err(AppError::Parser(error)),
                }
            }

            DocFormat::Office => {
                let tika = self
                    .services
                    .tika
                    .as_ref()
                    .filter(|t| t.is_configured())
                    .ok_or_else(|| {
                        AppError::Parser(
                            "TIKA_SERVER_URL required for office documents".to_string(),
                        )
                    })?;

                let text = tika
                    .extract_text(path)
                    .await
                    .map_err(|e| AppError::Parser(e.to_string()))?;
                if text.trim().is_empty() {
                    return Err(AppError::Parser(format!(
                        "tika returned empty text for {}",
                        path.display()
                    )));
                }

                let content_path = path.with_extension("md");
                tokio::fs::write(&content_path, &text).await.map_err(|e| {
                    AppError::Parser(format!("write {}: {}", content_path.display(), e))
                })?;

                // Office extraction is already Tika-backed; reuse its
                // metadata directly instead of re-enriching later.
                let metadata = match tika.extract_metadata(path).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        tracing::warn!(error = %e, "tika metadata extraction failed");
                        serde_json::Map::new()
                    }
                };
                Ok((content_path, metadata))
            }
        }
    }

    /// Fill missing parser-metadata keys from the text-extraction server.
    /// Failures are logged and ignored.
    async fn enrich_parser_metadata(
        &self,
        path: &Path,
        parser_metadata: &mut serde_json::Map<String, Value>,
    ) {
        let Some(tika) = self.services.tika.as_ref().filter(|t| t.is_configured()) else {
            return;
        };
        match tika.extract_metadata(path).await {
            Ok(extracted) => {
                for (key, value) in extracted {
                    parser_metadata.entry(key).or_insert(value);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "parser metadata enrichment failed (non-fatal)");
            }
        }
    }

    /// Apply tier-1 LLM metadata: fill gaps on title/document_type, union
    /// suggested tags, and stash the rest under an `llm_*` namespace.
    fn apply_tier1(
        doc: &mut DocumentMetadata,
        parser_metadata: &serde_json::Map<String, Value>,
        llm: &serde_json::Map<String, Value>,
    ) {
        let parser_title = parser_metadata
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("");
        if doc.title.is_empty() && parser_title.is_empty() {
            if let Some(title) = llm.get("title").and_then(Value::as_str) {
                if !title.is_empty() {
                    doc.title = title.to_string();
                }
            }
        }

        if doc.document_type.is_empty() {
            if let Some(doc_type) = llm.get("document_type").and_then(Value::as_str) {
                if DOCUMENT_TYPES.contains(&doc_type) {
                    doc.document_type = doc_type.to_string();
                }
            }
        }

        if let Some(suggested) = llm.get("suggested_tags").and_then(Value::as_array) {
            let mut seen: std::collections::HashSet<String> =
                doc.tags.iter().map(|t| t.to_lowercase()).collect();
            for tag in suggested.iter().filter_map(Value::as_str) {
                if !tag.is_empty() && seen.insert(tag.to_lowercase()) {
                    doc.tags.push(tag.to_string());
                }
            }
        }

        for key in ["summary", "keywords", "entities", "key_topics"] {
            if let Some(value) = llm.get(key) {
                doc.extra.insert(format!("llm_{}", key), value.clone());
            }
        }
    }

    /// Format routing for the archive artifact. Returns the path to
    /// archive plus the generated PDF path when rendering happened.
    async fn prepare_archive_file(
        &self,
        path: &Path,
        format: DocFormat,
    ) -> (PathBuf, Option<PathBuf>) {
        if matches!(format, DocFormat::Pdf | DocFormat::Other) {
            return (path.to_path_buf(), None);
        }
        let Some(renderer) = self.services.renderer.as_ref().filter(|r| r.is_configured()) else {
            return (path.to_path_buf(), None);
        };

        let rendered = match format {
            DocFormat::Markdown => renderer.markdown_to_pdf(path).await,
            DocFormat::Html => renderer.html_to_pdf(path).await,
            DocFormat::Office => renderer.office_to_pdf(path).await,
            DocFormat::Pdf | DocFormat::Other => unreachable!(),
        };

        match rendered {
            Ok(bytes) => {
                let pdf_path = path.with_extension("archive.pdf");
                match tokio::fs::write(&pdf_path, bytes).await {
                    Ok(()) => (pdf_path.clone(), Some(pdf_path)),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to write rendered PDF, archiving original");
                        (path.to_path_buf(), None)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "PDF rendering failed, archiving original");
                (path.to_path_buf(), None)
            }
        }
    }

    /// Delete local files when the document has safely landed: archive
    /// verified, or archive disabled and RAG succeeded. Failures are
    /// logged and ignored.
    fn cleanup(
        &self,
        path: &Path,
        content_path: &Path,
        generated_pdf: Option<&Path>,
        outcome: DocOutcome,
    ) {
        let should_delete = if self.services.archive.is_some() {
            outcome.verified
        } else {
            outcome.rag_indexed
        };
        if !should_delete {
            return;
        }

        tracing::info!("deleting local files (archived/verified)");
        let sidecar = path.with_extension("json");
        let mut targets: Vec<&Path> = vec![path];
        if content_path != path {
            targets.push(content_path);
        }
        if let Some(pdf) = generated_pdf {
            targets.push(pdf);
        }
        targets.push(&sidecar);

        for target in targets {
            if target.exists() {
                if let Err(e) = std::fs::remove_file(target) {
                    tracing::warn!(file = %target.display(), error = %e, "failed to delete local file");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
