//! Backend registry: (kind, name) → factory.
//!
//! Replaces if/else chains in the service container with a lookup table of
//! factory functions. Adding a new backend is a single `register` call.
//! Factories receive the container explicitly and pull effective
//! configuration through its helpers; backends hold no back-reference.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::{ArchiveBackend, ParserBackend, RagBackend};
use crate::container::ServiceContainer;
use crate::types::{AppError, Result};
use crate::vectorstore::VectorStore;

/// The closed set of backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Parser,
    Archive,
    Rag,
    VectorStore,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Parser => "parser",
            Self::Archive => "archive",
            Self::Rag => "rag",
            Self::VectorStore => "vectorstore",
        };
        write!(f, "{}", name)
    }
}

/// A configured backend instance of any kind.
pub enum BackendInstance {
    Parser(Arc<dyn ParserBackend>),
    Archive(Arc<dyn ArchiveBackend>),
    Rag(Arc<dyn RagBackend>),
    VectorStore(Arc<dyn VectorStore>),
}

/// Factory producing a configured backend from the service container.
pub type BackendFactory = fn(&ServiceContainer) -> Result<BackendInstance>;

/// Registry mapping (kind, name) to factory functions.
pub struct BackendRegistry {
    factories: HashMap<(BackendKind, String), BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for a kind/name pair.
    pub fn register(&mut self, kind: BackendKind, name: &str, factory: BackendFactory) {
        self.factories.insert((kind, name.to_string()), factory);
    }

    /// Create a backend instance. Unknown names fail with a descriptive
    /// error.
    pub fn create(
        &self,
        kind: BackendKind,
        name: &str,
        container: &ServiceContainer,
    ) -> Result<BackendInstance> {
        let factory = self
            .factories
            .get(&(kind, name.to_string()))
            .ok_or_else(|| {
                AppError::Configuration(format!("Unknown {} backend: {}", kind, name))
            })?;
        factory(container)
    }

    /// Whether a kind/name pair is registered.
    pub fn has(&self, kind: BackendKind, name: &str) -> bool {
        self.factories.contains_key(&(kind, name.to_string()))
    }

    /// Registered backend names for a kind.
    pub fn names(&self, kind: BackendKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        default_registry()
    }
}

// --- Parser factories ---

fn create_docling_serve_parser(container: &ServiceContainer) -> Result<BackendInstance> {
    use crate::backends::parsers::DoclingServeParser;
    Ok(BackendInstance::Parser(Arc::new(DoclingServeParser::new(
        &container.effective_url("docling_serve", &container.config().docling_serve_url),
        container.effective_timeout("docling_serve", container.config().docling_serve_timeout),
    ))))
}

fn create_tika_parser(container: &ServiceContainer) -> Result<BackendInstance> {
    use crate::backends::parsers::TikaParser;
    Ok(BackendInstance::Parser(Arc::new(TikaParser::new(
        container.tika_client(),
    ))))
}

fn create_mineru_parser(_container: &ServiceContainer) -> Result<BackendInstance> {
    Err(AppError::Configuration(
        "Parser backend 'mineru' not yet implemented".to_string(),
    ))
}

// --- Archive factories ---

fn create_paperless_archive(container: &ServiceContainer) -> Result<BackendInstance> {
    use crate::backends::archives::{PaperlessArchiveBackend, PaperlessClient};
    let client = PaperlessClient::new(
        &container.effective_url("paperless", &container.config().paperless_url),
        &container.config().paperless_token,
        container.effective_timeout("paperless", 30),
    );
    Ok(BackendInstance::Archive(Arc::new(
        PaperlessArchiveBackend::new(client),
    )))
}

fn create_s3_archive(_container: &ServiceContainer) -> Result<BackendInstance> {
    Err(AppError::Configuration(
        "Archive backend 's3' not yet implemented".to_string(),
    ))
}

fn create_local_archive(_container: &ServiceContainer) -> Result<BackendInstance> {
    Err(AppError::Configuration(
        "Archive backend 'local' not yet implemented".to_string(),
    ))
}

// --- Vector store factories ---

fn create_pgvector_store(container: &ServiceContainer) -> Result<BackendInstance> {
    use crate::vectorstore::PgVectorStore;
    let config = container.config();
    if config.database_url.is_empty() {
        return Err(AppError::Configuration(
            "PgVector configuration missing: DATABASE_URL is required".to_string(),
        ));
    }
    Ok(BackendInstance::VectorStore(Arc::new(PgVectorStore::new(
        &config.database_url,
        config.embedding_dimensions,
        &config.pgvector_view_name,
        config.pgvector_drop_on_mismatch,
    )?)))
}

// --- RAG factories ---

fn create_vector_rag(container: &ServiceContainer) -> Result<BackendInstance> {
    use crate::backends::rag::VectorRagBackend;
    use crate::chunking::{create_chunker, ChunkingStrategy};

    let config = container.config();
    let store = container.vector_store()?;
    let embedder = container.embedding_client()?;

    let strategy: ChunkingStrategy = config.chunking_strategy.parse()?;
    let chunker = create_chunker(
        strategy,
        config.chunk_max_tokens,
        config.chunk_overlap_tokens,
        &container.effective_url("docling_serve", &config.docling_serve_url),
        container.effective_timeout("docling_serve", config.docling_serve_timeout),
    )?;

    let enrichment = container.contextual_enrichment_service()?;

    Ok(BackendInstance::Rag(Arc::new(VectorRagBackend::new(
        store,
        embedder,
        chunker,
        enrichment,
        config.contextual_enrichment_window,
    ))))
}

/// Build the registry with every known backend, including
/// known-but-unimplemented names.
pub fn default_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();

    // Parsers
    registry.register(BackendKind::Parser, "docling_serve", create_docling_serve_parser);
    registry.register(BackendKind::Parser, "tika", create_tika_parser);
    registry.register(BackendKind::Parser, "mineru", create_mineru_parser);

    // Archives
    registry.register(BackendKind::Archive, "paperless", create_paperless_archive);
    registry.register(BackendKind::Archive, "s3", create_s3_archive);
    registry.register(BackendKind::Archive, "local", create_local_archive);

    // Vector stores
    registry.register(BackendKind::VectorStore, "pgvector", create_pgvector_store);

    // RAG — "vector" and "pgvector" both resolve to the generic vector
    // adapter.
    registry.register(BackendKind::Rag, "vector", create_vector_rag);
    registry.register(BackendKind::Rag, "pgvector", create_vector_rag);

    registry
}

// ============================================================================
// Tests
// ============================================================================
