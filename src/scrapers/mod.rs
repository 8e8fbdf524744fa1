//! Scraper contract and registry.
//!
//! Scrapers are external collaborators: site-specific crawlers that download
//! artifacts to disk and describe them as loosely-typed maps. The pipeline
//! consumes a scraper as a lazy event stream — one event per document, then
//! a terminal summary with the scraper's own counters and errors.

use std::collections::HashMap;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{AppError, Result};

/// Terminal counters from one scraper run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScraperSummary {
    /// "completed" or "failed".
    pub status: String,
    pub scraped_count: u32,
    pub downloaded_count: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ScraperSummary {
    pub fn failed(&self) -> bool {
        self.status == "failed"
    }
}

/// One event from a scraper's lazy sequence.
#[derive(Debug, Clone)]
pub enum ScrapeEvent {
    /// A downloaded document described as a field map. Must contain at
    /// least `title`, `url`, `filename`, and `local_path` or `pdf_path`.
    Document(serde_json::Map<String, Value>),
    /// Terminal event carrying the scraper's counters.
    Done(ScraperSummary),
}

/// Contract for scrapers consumed by the streaming driver.
pub trait Scraper: Send {
    /// Scraper name (also the vector-store partition key).
    fn name(&self) -> &str;

    /// Lazily yield scrape events. The stream ends after a single
    /// [`ScrapeEvent::Done`].
    fn events(&mut self) -> BoxStream<'_, ScrapeEvent>;
}

impl std::fmt::Debug for dyn Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper").field("name", &self.name()).finish()
    }
}

/// Options handed to a scraper factory.
#[derive(Debug, Clone, Default)]
pub struct ScraperOptions {
    pub max_pages: Option<u32>,
}

type ScraperFactory = Box<dyn Fn(ScraperOptions) -> Box<dyn Scraper> + Send + Sync>;

/// Name → factory table for scrapers.
#[derive(Default)]
pub struct ScraperRegistry {
    factories: HashMap<String, ScraperFactory>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(ScraperOptions) -> Box<dyn Scraper> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Instantiate a scraper by name.
    pub fn create(&self, name: &str, options: ScraperOptions) -> Result<Box<dyn Scraper>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("Scraper not found: {}", name)))?;
        Ok(factory(options))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A scripted scraper yielding a fixed list of documents. Useful for tests
/// and for replaying previously downloaded batches.
pub struct StaticScraper {
    name: String,
    documents: Vec<serde_json::Map<String, Value>>,
    summary: ScraperSummary,
}

impl StaticScraper {
    pub fn new(
        name: impl Into<String>,
        documents: Vec<serde_json::Map<String, Value>>,
        summary: ScraperSummary,
    ) -> Self {
        Self {
            name: name.into(),
            documents,
            summary,
        }
    }
}

impl Scraper for StaticScraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn events(&mut self) -> BoxStream<'_, ScrapeEvent> {
        let mut events: Vec<ScrapeEvent> =
            self.documents.drain(..).map(ScrapeEvent::Document).collect();
        events.push(ScrapeEvent::Done(self.summary.clone()));
        Box::pin(futures::stream::iter(events))
    }
}

/// Scraper over a local directory: yields one document per file, with
/// metadata derived from the filename. Used to (re)ingest batches that are
/// already on disk.
pub struct DirectoryScraper {
    name: String,
    directory: std::path::PathBuf,
    max_pages: Option<u32>,
}

impl DirectoryScraper {
    pub fn new(name: impl Into<String>, directory: impl Into<std::path::PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            max_pages: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    fn document_for(path: &std::path::Path) -> serde_json::Map<String, Value> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.clone());

        let mut map = serde_json::Map::new();
        map.insert("title".to_string(), Value::String(title));
        map.insert(
            "url".to_string(),
            Value::String(format!("file://{}", path.display())),
        );
        map.insert("filename".to_string(), Value::String(filename));
        map.insert(
            "local_path".to_string(),
            Value::String(path.to_string_lossy().to_string()),
        );
        map
    }
}

impl Scraper for DirectoryScraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn events(&mut self) -> BoxStream<'_, ScrapeEvent> {
        let mut events: Vec<ScrapeEvent> = Vec::new();
        let mut summary = ScraperSummary {
            status: "completed".to_string(),
            ..Default::default()
        };

        match std::fs::read_dir(&self.directory) {
            Ok(entries) => {
                let mut files: Vec<std::path::PathBuf> = entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| path.is_file())
                    .collect();
                files.sort();
                if let Some(limit) = self.max_pages {
                    files.truncate(limit as usize);
                }

                summary.scraped_count = files.len() as u32;
                summary.downloaded_count = files.len() as u32;
                events.extend(
                    files
                        .iter()
                        .map(|path| ScrapeEvent::Document(Self::document_for(path))),
                );
            }
            Err(e) => {
                summary.status = "failed".to_string();
                summary
                    .errors
                    .push(format!("read {}: {}", self.directory.display(), e));
            }
        }

        events.push(ScrapeEvent::Done(summary));
        Box::pin(futures::stream::iter(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_registry_lookup() {
        let mut registry = ScraperRegistry::new();
        registry.register("acme", |_opts| {
            Box::new(StaticScraper::new(
                "acme",
                Vec::new(),
                ScraperSummary::default(),
            ))
        });

        assert!(registry.create("acme", ScraperOptions::default()).is_ok());
        let err = registry
            .create("missing", ScraperOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("Scraper not found: missing"));
        assert_eq!(registry.names(), vec!["acme".to_string()]);
    }

    #[tokio::test]
    async fn test_directory_scraper_yields_files_then_done() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let mut scraper = DirectoryScraper::new("inbox", dir.path());
        let events: Vec<ScrapeEvent> = scraper.events().collect().await;

        assert_eq!(events.len(), 3);
        let ScrapeEvent::Document(first) = &events[0] else {
            panic!("expected document");
        };
        assert_eq!(first.get("filename"), Some(&Value::from("a.pdf")));
        assert_eq!(first.get("title"), Some(&Value::from("a")));
        assert!(first.contains_key("local_path"));
        let ScrapeEvent::Done(summary) = &events[2] else {
            panic!("expected done");
        };
        assert_eq!(summary.downloaded_count, 2);
        assert!(!summary.failed());
    }

    #[tokio::test]
    async fn test_directory_scraper_missing_dir_fails() {
        let mut scraper = DirectoryScraper::new("inbox", "/definitely/not/here");
        let events: Vec<ScrapeEvent> = scraper.events().collect().await;
        assert_eq!(events.len(), 1);
        let ScrapeEvent::Done(summary) = &events[0] else {
            panic!("expected done");
        };
        assert!(summary.failed());
    }

    #[tokio::test]
    async fn test_directory_scraper_max_pages() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let mut scraper = DirectoryScraper::new("inbox", dir.path()).with_max_pages(Some(2));
        let events: Vec<ScrapeEvent> = scraper.events().collect().await;
        assert_eq!(events.len(), 3); // 2 documents + done
    }

    #[tokio::test]
    async fn test_static_scraper_yields_done_last() {
        let mut doc = serde_json::Map::new();
        doc.insert("title".to_string(), Value::from("T"));
        let mut scraper = StaticScraper::new(
            "acme",
            vec![doc],
            ScraperSummary {
                status: "completed".to_string(),
                scraped_count: 1,
                downloaded_count: 1,
                errors: Vec::new(),
            },
        );

        let events: Vec<ScrapeEvent> = scraper.events().collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ScrapeEvent::Document(_)));
        assert!(matches!(events[1], ScrapeEvent::Done(_)));
    }
}
