//! Paperless-ngx archive backend.
//!
//! Uploads documents via the multipart `post_document` endpoint (returns an
//! opaque task id), verifies by polling the task endpoint until a concrete
//! archived-document id appears, and applies deferred custom fields once
//! verification succeeds. Pending custom-field metadata is held in a
//! bounded insertion-order cache (capacity 100, oldest evicted).

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backends::ArchiveBackend;
use crate::types::{AppError, ArchiveOutcome, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const PENDING_METADATA_CAP: usize = 100;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// HTTP Client
// ============================================================================

#[derive(Debug, Deserialize)]
struct TaskStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    related_document: Option<Value>,
}

/// Thin client for the Paperless-ngx REST API.
pub struct PaperlessClient {
    url: String,
    token: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl PaperlessClient {
    pub fn new(url: &str, token: &str, timeout: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout: Duration::from_secs(timeout),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.token.is_empty()
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Token {}", self.token))
    }

    /// Probe the API root.
    pub async fn health_check(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        let response = self
            .auth(self.client.get(format!("{}/api/", self.url)))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        matches!(response, Ok(r) if r.status().is_success())
    }

    /// Upload a document. Returns the consume-task id, or `None` when the
    /// server answered without one.
    pub async fn post_document(
        &self,
        path: &Path,
        title: &str,
        created: Option<&str>,
        correspondent: Option<&str>,
        tags: &[String],
    ) -> Result<Option<String>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Archive(format!("read {}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());

        let mut form = reqwest::multipart::Form::new()
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("title", title.to_string());
        if let Some(created) = created {
            form = form.text("created", created.to_string());
        }
        if let Some(correspondent) = correspondent {
            form = form.text("correspondent", correspondent.to_string());
        }
        for tag in tags {
            form = form.text("tags", tag.clone());
        }

        let response = self
            .auth(
                self.client
                    .post(format!("{}/api/documents/post_document/", self.url)),
            )
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::Archive(format!("paperless upload request: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Archive(format!("paperless upload: {}", e)))?;

        // The endpoint returns the task UUID as a bare JSON string.
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Archive(format!("paperless upload response: {}", e)))?;
        Ok(body.as_str().map(str::to_string).filter(|s| !s.is_empty()))
    }

    /// One poll of the task endpoint. Returns the archived-document id when
    /// the task has completed successfully.
    pub async fn poll_task(&self, task_id: &str) -> Result<Option<i64>> {
        let response = self
            .auth(self.client.get(format!("{}/api/tasks/", self.url)))
            .query(&[("task_id", task_id)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::Archive(format!("paperless task request: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Archive(format!("paperless tasks: {}", e)))?;

        let tasks: Vec<TaskStatus> = response
            .json()
            .await
            .map_err(|e| AppError::Archive(format!("paperless task response: {}", e)))?;

        let Some(task) = tasks.into_iter().next() else {
            return Ok(None);
        };
        if task.status != "SUCCESS" {
            return Ok(None);
        }
        let related = match task.related_document {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        Ok(related)
    }

    /// Apply custom fields to an archived document.
    pub async fn set_custom_fields(
        &self,
        document_id: i64,
        fields: &serde_json::Map<String, Value>,
    ) -> Result<()> {
        self.auth(
            self.client
                .patch(format!("{}/api/documents/{}/", self.url, document_id)),
        )
        .json(&json!({ "custom_fields": fields }))
        .timeout(self.timeout)
        .send()
        .await
        .map_err(|e| AppError::Archive(format!("paperless custom fields request: {}", e)))?
        .error_for_status()
        .map_err(|e| AppError::Archive(format!("paperless custom fields: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// Archive Backend
// ============================================================================

/// Archive backend using Paperless-ngx.
pub struct PaperlessArchiveBackend {
    client: PaperlessClient,
    pending_metadata: parking_lot::Mutex<LruCache<String, serde_json::Map<String, Value>>>,
}

impl PaperlessArchiveBackend {
    pub fn new(client: PaperlessClient) -> Self {
        Self {
            client,
            pending_metadata: parking_lot::Mutex::new(LruCache::new(
                NonZeroUsize::new(PENDING_METADATA_CAP).expect("cap is non-zero"),
            )),
        }
    }

    fn failure(&self, error: impl Into<String>) -> ArchiveOutcome {
        ArchiveOutcome::Failure {
            error: error.into(),
            archive_name: self.name().to_string(),
        }
    }

    /// Normalize a trailing `Z` to `+00:00` and parse as ISO-8601. Invalid
    /// dates are logged and dropped, never fatal.
    fn parse_created(created: &str) -> Option<String> {
        let normalized = match created.strip_suffix('Z') {
            Some(head) => format!("{}+00:00", head),
            None => created.to_string(),
        };
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&normalized) {
            return Some(dt.to_rfc3339());
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
            return Some(date.format("%Y-%m-%d").to_string());
        }
        tracing::warn!(created, "invalid date format, archiving without date");
        None
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending_metadata.lock().len()
    }
}

#[async_trait]
impl ArchiveBackend for PaperlessArchiveBackend {
    fn name(&self) -> &'static str {
        "paperless"
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    async fn is_available(&self) -> bool {
        self.is_configured()
    }

    async fn archive(
        &self,
        path: &Path,
        title: &str,
        created: Option<&str>,
        correspondent: Option<&str>,
        tags: &[String],
        metadata: &serde_json::Map<String, Value>,
    ) -> ArchiveOutcome {
        if !self.is_configured() {
            return self.failure("Paperless not configured (missing URL or token)");
        }
        if !path.exists() {
            return self.failure(format!("File not found: {}", path.display()));
        }

        let created = created.and_then(Self::parse_created);

        let task_id = match self
            .client
            .post_document(path, title, created.as_deref(), correspondent, tags)
            .await
        {
            Ok(Some(task_id)) => task_id,
            Ok(None) => return self.failure("Paperless upload failed (no task_id returned)"),
            Err(e) => return self.failure(e.to_string()),
        };

        // Hold metadata for custom fields until verification succeeds.
        if !metadata.is_empty() {
            self.pending_metadata
                .lock()
                .put(task_id.clone(), metadata.clone());
        }

        tracing::info!(task_id = %task_id, "document archived to paperless");
        ArchiveOutcome::Success {
            document_id: task_id.clone(),
            url: Some(format!("{}/tasks/{}", self.client.url(), task_id)),
            archive_name: self.name().to_string(),
        }
    }

    async fn verify(&self, document_id: &str, timeout: u64) -> bool {
        if !self.is_configured() {
            tracing::error!("cannot verify, paperless not configured");
            return false;
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout);
        let mut verified_id: Option<i64> = None;

        loop {
            match self.client.poll_task(document_id).await {
                Ok(Some(id)) => {
                    verified_id = Some(id);
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "task poll failed, retrying");
                }
            }
            if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        // Always drop pending metadata for this task, verified or not.
        let pending = self.pending_metadata.lock().pop(document_id);

        if let (Some(id), Some(fields)) = (verified_id, pending) {
            if let Err(e) = self.client.set_custom_fields(id, &fields).await {
                tracing::warn!(error = %e, "failed to set custom fields");
            }
        }

        verified_id.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
