//! Streaming driver: consumes a scraper's lazy event sequence and feeds
//! each document through the orchestrator, strictly serially, aggregating a
//! run summary.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use futures::StreamExt;
use serde_json::Value;

use super::Pipeline;
use crate::scrapers::{ScrapeEvent, Scraper, ScraperSummary};
use crate::types::{DocumentMetadata, PipelineResult, PipelineStatus};

/// Keys a scraper may legitimately put in a document map. Everything else
/// is dropped (with a log) before metadata reconstruction.
const KNOWN_FIELDS: &[&str] = &[
    "url",
    "title",
    "filename",
    "publication_date",
    "organization",
    "tags",
    "document_type",
    "author",
    "page_count",
    "language",
    "description",
    "keywords",
    "image_url",
    "extra",
];

const PATH_FIELDS: &[&str] = &["pdf_path", "local_path"];

impl Pipeline {
    /// Execute the full run: drain the scraper, process each document, and
    /// aggregate counters, timings, and errors.
    pub async fn run(&self, scraper: &mut dyn Scraper) -> PipelineResult {
        let run_started = Instant::now();
        let mut result = PipelineResult::new(self.scraper_name());
        let mut timings: BTreeMap<String, f64> = BTreeMap::new();
        let mut summary: Option<ScraperSummary> = None;

        tracing::info!(scraper = %self.scraper_name(), "pipeline.scrape.start");

        {
            let mut events = scraper.events();
            while let Some(event) = events.next().await {
                match event {
                    ScrapeEvent::Done(s) => {
                        summary = Some(s);
                    }
                    ScrapeEvent::Document(map) => {
                        self.handle_document(map, &mut result, &mut timings).await;
                    }
                }
            }
        }

        match summary {
            Some(summary) => {
                result.scraped_count = summary.scraped_count;
                result.downloaded_count = summary.downloaded_count;
                result.errors.extend(summary.errors.iter().cloned());
                if summary.failed() {
                    result.status = PipelineStatus::Failed;
                    result.errors.push("Scraper failed".to_string());
                } else if result.failed_count > 0 {
                    result.status = PipelineStatus::Partial;
                } else {
                    result.status = PipelineStatus::Completed;
                }
            }
            None => {
                result.status = PipelineStatus::Failed;
                result
                    .errors
                    .push("Scraper terminated without a run summary".to_string());
            }
        }

        result.duration_seconds = run_started.elapsed().as_secs_f64();
        result.completed_at = Some(chrono::Utc::now().to_rfc3339());
        result.step_times = timings;

        tracing::info!(
            scraper = %result.scraper_name,
            status = %result.status,
            downloaded = result.downloaded_count,
            parsed = result.parsed_count,
            archived = result.archived_count,
            verified = result.verified_count,
            rag_indexed = result.rag_indexed_count,
            failed = result.failed_count,
            duration_s = result.duration_seconds,
            step_times = ?result.step_times,
            "pipeline.completed"
        );

        if let Some(tracker) = &self.services.state_tracker {
            if let Err(e) = tracker.record_run(&result) {
                tracing::warn!(error = %e, "failed to record last-run state");
            }
        }

        result
    }

    /// Process one yielded document map: filter fields, rebuild metadata,
    /// resolve the on-disk path, and run the state machine. Counter updates
    /// are committed here, never mid-document.
    async fn handle_document(
        &self,
        map: serde_json::Map<String, Value>,
        result: &mut PipelineResult,
        timings: &mut BTreeMap<String, f64>,
    ) {
        let title = map
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();

        let Some((doc, path)) = self.build_document(&map, &title) else {
            result.failed_count += 1;
            return;
        };

        if !path.exists() {
            tracing::warn!(path = %path.display(), "skipping document (file not found)");
            result.failed_count += 1;
            return;
        }

        match self.process_document(doc, &path, timings).await {
            Ok(outcome) => {
                if outcome.parsed {
                    result.parsed_count += 1;
                }
                if outcome.archived {
                    result.archived_count += 1;
                }
                if outcome.verified {
                    result.verified_count += 1;
                }
                if outcome.rag_indexed {
                    result.rag_indexed_count += 1;
                }
            }
            Err(e) => {
                tracing::error!(title = %title, error = %e, "document processing failed");
                result.failed_count += 1;
                result.errors.push(format!("{}: {}", title, e.message()));
            }
        }
    }

    /// Filter a scraper map to the known field set (logging dropped keys),
    /// reconstruct [`DocumentMetadata`], and resolve the artifact path.
    fn build_document(
        &self,
        map: &serde_json::Map<String, Value>,
        title: &str,
    ) -> Option<(DocumentMetadata, PathBuf)> {
        let dropped: Vec<&str> = map
            .keys()
            .map(String::as_str)
            .filter(|k| !KNOWN_FIELDS.contains(k) && !PATH_FIELDS.contains(k))
            .collect();
        if !dropped.is_empty() {
            tracing::debug!(title = %title, dropped = %dropped.join(", "), "dropped unknown document fields");
        }

        let filtered: serde_json::Map<String, Value> = map
            .iter()
            .filter(|(k, _)| KNOWN_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let doc: DocumentMetadata = match serde_json::from_value(Value::Object(filtered)) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(title = %title, error = %e, "failed to construct document metadata");
                return None;
            }
        };

        let path = map
            .get("pdf_path")
            .or_else(|| map.get("local_path"))
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty());
        let Some(path) = path else {
            tracing::warn!(title = %title, "skipping document (no file path)");
            return None;
        };

        Some((doc, PathBuf::from(path)))
    }
}
