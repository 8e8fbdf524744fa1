//! # Landfall — document ingestion pipeline
//!
//! Landfall takes documents downloaded by web scrapers and lands each one in
//! two places at once: a long-term archive (Paperless-ngx-style) with
//! searchable metadata, and a pgvector-backed RAG index for semantic search.
//!
//! For every scraped artifact the pipeline:
//!
//! 1. Routes the format (PDF / markdown / HTML / office) through the right
//!    extraction path to a canonical markdown form
//! 2. Enriches metadata (Tika fields, optional LLM tier-1 extraction)
//! 3. Archives a human-readable artifact and verifies it landed
//! 4. Chunks, embeds, and persists vectors with replace-document semantics
//! 5. Cleans up local files once the document is safely stored
//!
//! Archive-path errors are fatal for the document; RAG-path errors are
//! recoverable and only counted.
//!
//! ## Library usage
//!
//! ```rust,ignore
//! use landfall::container::get_container;
//! use landfall::pipeline::{Pipeline, PipelineOptions};
//!
//! let container = get_container()?;
//! let pipeline = Pipeline::from_container(&container, PipelineOptions::new("acme")).await?;
//! let mut scraper = my_scraper();
//! let result = pipeline.run(scraper.as_mut()).await;
//! println!("{}", result.to_json());
//! ```

pub mod backends;
pub mod chunking;
pub mod clients;
pub mod container;
pub mod embedding;
pub mod enrichment;
pub mod llm;
pub mod pipeline;
pub mod registry;
pub mod scrapers;
pub mod settings;
pub mod state;
pub mod types;
pub mod utils;
pub mod vectorstore;

pub use container::{get_container, ServiceContainer};
pub use pipeline::{Pipeline, PipelineOptions};
pub use types::{AppError, DocumentMetadata, PipelineResult, PipelineStatus, Result};
