//! Service container for dependency injection.
//!
//! A process-wide singleton providing lazy, cached access to every backend
//! and auxiliary client. Backend construction goes through the registry;
//! effective configuration values resolve runtime setting overrides against
//! the environment config. `reset_services` clears backend caches while
//! preserving settings and state trackers; `reset` clears everything.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use crate::backends::{ArchiveBackend, ParserBackend, RagBackend};
use crate::clients::{RendererClient, TikaClient};
use crate::embedding::{create_embedding_client, EmbeddingClient};
use crate::enrichment::DocumentEnrichmentService;
use crate::llm::{create_llm_client, LlmClient};
use crate::registry::{BackendInstance, BackendKind, BackendRegistry};
use crate::settings::SettingsManager;
use crate::state::StateTracker;
use crate::types::{AppError, Result};
use crate::utils::config::Config;
use crate::vectorstore::VectorStore;

static CONTAINER: OnceLock<Arc<ServiceContainer>> = OnceLock::new();

/// Get the global service container, creating it on first access.
pub fn get_container() -> Result<Arc<ServiceContainer>> {
    if let Some(container) = CONTAINER.get() {
        return Ok(container.clone());
    }
    let config = Config::from_env()?;
    let settings = SettingsManager::load(&config.settings_file);
    let container = Arc::new(ServiceContainer::new(
        config,
        settings,
        crate::registry::default_registry(),
    ));
    Ok(CONTAINER.get_or_init(|| container).clone())
}

/// Dependency injection container for all pipeline services.
pub struct ServiceContainer {
    config: Config,
    settings: SettingsManager,
    registry: BackendRegistry,

    // Backend instances (lazy-loaded). The async accessors probe
    // availability between the slot checks, so their creation is
    // additionally serialized under `backend_creation_lock`.
    parser_backend: RwLock<Option<Arc<dyn ParserBackend>>>,
    archive_backend: RwLock<Option<Arc<dyn ArchiveBackend>>>,
    rag_backend: RwLock<Option<Arc<dyn RagBackend>>>,
    vector_store: RwLock<Option<Arc<dyn VectorStore>>>,
    backend_creation_lock: tokio::sync::Mutex<()>,

    // Service client instances (lazy-loaded)
    embedding_client: RwLock<Option<Arc<dyn EmbeddingClient>>>,
    llm_client: RwLock<Option<Arc<dyn LlmClient>>>,
    tika_client: RwLock<Option<Arc<TikaClient>>>,
    renderer_client: RwLock<Option<Arc<RendererClient>>>,

    // State trackers (cached per scraper)
    state_trackers: Mutex<HashMap<String, Arc<StateTracker>>>,
}

impl ServiceContainer {
    pub fn new(config: Config, settings: SettingsManager, registry: BackendRegistry) -> Self {
        Self {
            config,
            settings,
            registry,
            parser_backend: RwLock::new(None),
            archive_backend: RwLock::new(None),
            rag_backend: RwLock::new(None),
            vector_store: RwLock::new(None),
            backend_creation_lock: tokio::sync::Mutex::new(()),
            embedding_client: RwLock::new(None),
            llm_client: RwLock::new(None),
            tika_client: RwLock::new(None),
            renderer_client: RwLock::new(None),
            state_trackers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &SettingsManager {
        &self.settings
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    // ----- effective-value resolution -----

    /// Setting override if non-empty, else the config value.
    pub fn effective_url(&self, service: &str, config_value: &str) -> String {
        let override_url = self.settings.service_url(service);
        if !override_url.is_empty() {
            override_url
        } else {
            config_value.to_string()
        }
    }

    /// Setting override if > 0, else the config value.
    pub fn effective_timeout(&self, service: &str, config_value: u64) -> u64 {
        let override_timeout = self.settings.service_timeout(service);
        if override_timeout > 0 {
            override_timeout
        } else {
            config_value
        }
    }

    /// Setting override if non-empty, else the `<KIND>_BACKEND` config.
    pub fn effective_backend(&self, kind: &str) -> String {
        let override_name = self.settings.pipeline_override(&format!("{}_backend", kind));
        if !override_name.is_empty() {
            return override_name;
        }
        match kind {
            "parser" => self.config.parser_backend.clone(),
            "archive" => self.config.archive_backend.clone(),
            "rag" => self.config.rag_backend.clone(),
            _ => String::new(),
        }
    }

    /// Merge strategy with settings override.
    pub fn effective_merge_strategy(&self) -> String {
        let override_value = self.settings.pipeline_override("metadata_merge_strategy");
        if !override_value.is_empty() {
            override_value
        } else {
            self.config.metadata_merge_strategy.clone()
        }
    }

    /// Filename template with settings override.
    pub fn effective_filename_template(&self) -> String {
        let override_value = self.settings.pipeline_override("filename_template");
        if !override_value.is_empty() {
            override_value
        } else {
            self.config.filename_template.clone()
        }
    }

    /// Contextual enrichment toggle: settings override beats config.
    pub fn contextual_enrichment_enabled(&self) -> bool {
        match self
            .settings
            .pipeline_override("contextual_enrichment_enabled")
            .as_str()
        {
            "true" => true,
            "false" => false,
            _ => self.config.contextual_enrichment_enabled,
        }
    }

    // ----- backends -----

    /// Parser backend (lazy singleton, double-checked). Fails when the
    /// effective name is unknown or the backend is unavailable.
    pub async fn parser_backend(&self) -> Result<Arc<dyn ParserBackend>> {
        if let Some(backend) = self.parser_backend.read().clone() {
            return Ok(backend);
        }
        // Availability probes await, so creation is serialized under its
        // own lock; re-check the slot once it is held.
        let _creating = self.backend_creation_lock.lock().await;
        if let Some(backend) = self.parser_backend.read().clone() {
            return Ok(backend);
        }
        let name = self.effective_backend("parser");
        let BackendInstance::Parser(backend) =
            self.registry.create(BackendKind::Parser, &name, self)?
        else {
            return Err(AppError::Internal(format!(
                "registry returned wrong kind for parser backend {}",
                name
            )));
        };
        if !backend.is_available().await {
            return Err(AppError::Configuration(format!(
                "Parser backend '{}' not available (check dependencies)",
                name
            )));
        }
        *self.parser_backend.write() = Some(backend.clone());
        tracing::info!(backend = %name, "initialized parser backend");
        Ok(backend)
    }

    /// Archive backend (lazy singleton, double-checked).
    pub async fn archive_backend(&self) -> Result<Arc<dyn ArchiveBackend>> {
        if let Some(backend) = self.archive_backend.read().clone() {
            return Ok(backend);
        }
        let _creating = self.backend_creation_lock.lock().await;
        if let Some(backend) = self.archive_backend.read().clone() {
            return Ok(backend);
        }
        let name = self.effective_backend("archive");
        let BackendInstance::Archive(backend) =
            self.registry.create(BackendKind::Archive, &name, self)?
        else {
            return Err(AppError::Internal(format!(
                "registry returned wrong kind for archive backend {}",
                name
            )));
        };
        if !backend.is_available().await {
            return Err(AppError::Configuration(format!(
                "Archive backend '{}' not available (check dependencies and configuration)",
                name
            )));
        }
        *self.archive_backend.write() = Some(backend.clone());
        tracing::info!(backend = %name, "initialized archive backend");
        Ok(backend)
    }

    /// RAG backend (lazy singleton, double-checked).
    pub async fn rag_backend(&self) -> Result<Arc<dyn RagBackend>> {
        if let Some(backend) = self.rag_backend.read().clone() {
            return Ok(backend);
        }
        let _creating = self.backend_creation_lock.lock().await;
        if let Some(backend) = self.rag_backend.read().clone() {
            return Ok(backend);
        }
        let name = self.effective_backend("rag");
        let BackendInstance::Rag(backend) = self.registry.create(BackendKind::Rag, &name, self)?
        else {
            return Err(AppError::Internal(format!(
                "registry returned wrong kind for rag backend {}",
                name
            )));
        };
        if !backend.is_available().await {
            return Err(AppError::Configuration(format!(
                "RAG backend '{}' not available (check configuration or connectivity)",
                name
            )));
        }
        *self.rag_backend.write() = Some(backend.clone());
        tracing::info!(backend = %name, "initialized RAG backend");
        Ok(backend)
    }

    /// Vector store (lazy singleton, double-checked). Construction is
    /// synchronous, so the second check happens under the write lock.
    pub fn vector_store(&self) -> Result<Arc<dyn VectorStore>> {
        if let Some(store) = self.vector_store.read().clone() {
            return Ok(store);
        }
        let mut slot = self.vector_store.write();
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let BackendInstance::VectorStore(store) =
            self.registry
                .create(BackendKind::VectorStore, "pgvector", self)?
        else {
            return Err(AppError::Internal(
                "registry returned wrong kind for vector store".to_string(),
            ));
        };
        *slot = Some(store.clone());
        tracing::debug!("initialized vector store");
        Ok(store)
    }

    // ----- clients -----

    /// Embedding client (lazy singleton, double-checked).
    pub fn embedding_client(&self) -> Result<Arc<dyn EmbeddingClient>> {
        if let Some(client) = self.embedding_client.read().clone() {
            return Ok(client);
        }
        let mut slot = self.embedding_client.write();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client: Arc<dyn EmbeddingClient> = create_embedding_client(
            &self.config.embedding_backend,
            &self.config.embedding_model,
            &self.effective_url("embedding", &self.config.embedding_url),
            &self.config.embedding_api_key,
            self.config.embedding_dimensions as usize,
            self.effective_timeout("embedding", self.config.embedding_timeout),
        )?
        .into();
        *slot = Some(client.clone());
        tracing::debug!("initialized embedding client");
        Ok(client)
    }

    /// LLM client (lazy singleton, double-checked). The LLM URL falls back
    /// to the embedding URL when unset (same inference server).
    pub fn llm_client(&self) -> Result<Arc<dyn LlmClient>> {
        if let Some(client) = self.llm_client.read().clone() {
            return Ok(client);
        }
        let mut slot = self.llm_client.write();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let mut llm_url = self.effective_url("llm", &self.config.llm_url);
        if llm_url.is_empty() {
            llm_url = self.effective_url("embedding", &self.config.embedding_url);
        }
        let client: Arc<dyn LlmClient> = create_llm_client(
            &self.config.llm_backend,
            &self.config.llm_model,
            &llm_url,
            &self.config.llm_api_key,
            self.effective_timeout("llm", self.config.llm_timeout),
        )?
        .into();
        *slot = Some(client.clone());
        tracing::debug!("initialized LLM client");
        Ok(client)
    }

    /// Tika client (lazy singleton, double-checked).
    pub fn tika_client(&self) -> Arc<TikaClient> {
        if let Some(client) = self.tika_client.read().clone() {
            return client;
        }
        let mut slot = self.tika_client.write();
        if let Some(client) = slot.as_ref() {
            return client.clone();
        }
        let client = Arc::new(TikaClient::new(
            &self.effective_url("tika", &self.config.tika_server_url),
            self.effective_timeout("tika", self.config.tika_timeout),
        ));
        *slot = Some(client.clone());
        client
    }

    /// PDF renderer client (lazy singleton, double-checked).
    pub fn renderer_client(&self) -> Arc<RendererClient> {
        if let Some(client) = self.renderer_client.read().clone() {
            return client;
        }
        let mut slot = self.renderer_client.write();
        if let Some(client) = slot.as_ref() {
            return client.clone();
        }
        let client = Arc::new(RendererClient::new(
            &self.effective_url("gotenberg", &self.config.gotenberg_url),
            self.effective_timeout("gotenberg", self.config.gotenberg_timeout),
        ));
        *slot = Some(client.clone());
        client
    }

    /// Tier-2 enrichment service when contextual enrichment is enabled and
    /// the LLM client is configured; `None` otherwise.
    pub fn contextual_enrichment_service(&self) -> Result<Option<Arc<DocumentEnrichmentService>>> {
        if !self.contextual_enrichment_enabled() {
            return Ok(None);
        }
        let llm = self.llm_client()?;
        if !llm.is_configured() {
            tracing::debug!("LLM client not configured, skipping contextual enrichment");
            return Ok(None);
        }
        Ok(Some(Arc::new(DocumentEnrichmentService::new(
            llm,
            self.config.llm_enrichment_max_tokens,
        ))))
    }

    /// Per-scraper state tracker (cached).
    pub fn state_tracker(&self, scraper_name: &str) -> Arc<StateTracker> {
        let mut trackers = self.state_trackers.lock();
        trackers
            .entry(scraper_name.to_string())
            .or_insert_with(|| {
                Arc::new(StateTracker::new(&self.config.state_dir, scraper_name))
            })
            .clone()
    }

    // ----- lifecycle -----

    /// Clear cached backends and clients so new settings take effect.
    /// Settings and state trackers are preserved.
    pub fn reset_services(&self) {
        *self.parser_backend.write() = None;
        *self.archive_backend.write() = None;
        *self.rag_backend.write() = None;
        *self.vector_store.write() = None;
        *self.embedding_client.write() = None;
        *self.llm_client.write() = None;
        *self.tika_client.write() = None;
        *self.renderer_client.write() = None;
        tracing::debug!("service/backend instances reset (settings preserved)");
    }

    /// Clear everything, including state trackers.
    pub fn reset(&self) {
        self.reset_services();
        self.state_trackers.lock().clear();
        tracing::debug!("service container reset");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_registry;
    use crate::settings::{Settings, SettingsManager};

    fn test_container() -> ServiceContainer {
        let mut config = Config::from_env().unwrap();
        config.tika_server_url = "http://tika:9998".to_string();
        config.embedding_url = "http://ollama:11434".to_string();
        let settings = SettingsManager::load("/nonexistent/settings.json");
        ServiceContainer::new(config, settings, default_registry())
    }

    fn container_with_settings(settings: Settings) -> ServiceContainer {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let manager = SettingsManager::load(&path);
        manager.save(settings).unwrap();
        ServiceContainer::new(Config::from_env().unwrap(), manager, default_registry())
    }

    #[test]
    fn test_effective_url_prefers_override() {
        let mut settings = Settings::default();
        settings.services.tika_url = "http://override:9998".to_string();
        let container = container_with_settings(settings);
        assert_eq!(
            container.effective_url("tika", "http://config:9998"),
            "http://override:9998"
        );
        assert_eq!(
            container.effective_url("gotenberg", "http://config:3000"),
            "http://config:3000"
        );
    }

    #[test]
    fn test_effective_timeout_zero_inherits() {
        let mut settings = Settings::default();
        settings.services.llm_timeout = 45;
        let container = container_with_settings(settings);
        assert_eq!(container.effective_timeout("llm", 120), 45);
        assert_eq!(container.effective_timeout("embedding", 60), 60);
    }

    #[test]
    fn test_effective_backend_override() {
        let mut settings = Settings::default();
        settings.pipeline.parser_backend = "tika".to_string();
        let container = container_with_settings(settings);
        assert_eq!(container.effective_backend("parser"), "tika");
        assert_eq!(container.effective_backend("archive"), "paperless");
    }

    #[test]
    fn test_contextual_enrichment_override() {
        let mut settings = Settings::default();
        settings.pipeline.contextual_enrichment_enabled = "true".to_string();
        let container = container_with_settings(settings);
        assert!(container.contextual_enrichment_enabled());

        let mut settings = Settings::default();
        settings.pipeline.contextual_enrichment_enabled = "false".to_string();
        let container = container_with_settings(settings);
        assert!(!container.contextual_enrichment_enabled());
    }

    #[tokio::test]
    async fn test_unknown_backend_name_errors() {
        let mut config = Config::from_env().unwrap();
        config.parser_backend = "nonexistent".to_string();
        let container = ServiceContainer::new(
            config,
            SettingsManager::load("/nonexistent/settings.json"),
            default_registry(),
        );
        let err = container.parser_backend().await.unwrap_err();
        assert!(err.to_string().contains("Unknown parser backend: nonexistent"));
    }

    #[tokio::test]
    async fn test_not_yet_implemented_backend() {
        let mut config = Config::from_env().unwrap();
        config.archive_backend = "s3".to_string();
        let container = ServiceContainer::new(
            config,
            SettingsManager::load("/nonexistent/settings.json"),
            default_registry(),
        );
        let err = container.archive_backend().await.unwrap_err();
        assert!(err.to_string().contains("not yet implemented"));
    }

    #[test]
    fn test_clients_are_cached() {
        let container = test_container();
        let first = container.tika_client();
        let second = container.tika_client();
        assert!(Arc::ptr_eq(&first, &second));

        container.reset_services();
        let third = container.tika_client();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_concurrent_first_access_yields_one_instance() {
        let container = Arc::new(test_container());
        let first = Arc::clone(&container);
        let second = Arc::clone(&container);

        let handle_a = std::thread::spawn(move || first.tika_client());
        let handle_b = std::thread::spawn(move || second.tika_client());
        let client_a = handle_a.join().unwrap();
        let client_b = handle_b.join().unwrap();

        assert!(Arc::ptr_eq(&client_a, &client_b));
    }

    #[test]
    fn test_state_tracker_cached_and_reset() {
        let container = test_container();
        let first = container.state_tracker("acme");
        let second = container.state_tracker("acme");
        assert!(Arc::ptr_eq(&first, &second));

        // reset_services preserves trackers, reset clears them.
        container.reset_services();
        let third = container.state_tracker("acme");
        assert!(Arc::ptr_eq(&first, &third));

        container.reset();
        let fourth = container.state_tracker("acme");
        assert!(!Arc::ptr_eq(&first, &fourth));
    }

    #[test]
    fn test_embedding_client_created() {
        let container = test_container();
        let client = container.embedding_client().unwrap();
        assert_eq!(client.name(), "ollama");
        assert!(client.is_configured());
    }

    #[test]
    fn test_llm_url_falls_back_to_embedding_url() {
        let container = test_container();
        // llm_url is empty in config; creation succeeds against the
        // embedding URL.
        let client = container.llm_client().unwrap();
        assert!(client.is_configured());
    }
}
