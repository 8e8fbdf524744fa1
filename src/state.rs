//! Per-scraper last-run record.
//!
//! A small JSON file per scraper under the state directory, updated after
//! every pipeline run and read back for scheduling/reporting. Opaque to the
//! pipeline itself.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{AppError, PipelineResult, Result};

/// Snapshot of a scraper's most recent run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastRun {
    pub status: String,
    pub completed_at: String,
    pub downloaded_count: u32,
    pub archived_count: u32,
    pub rag_indexed_count: u32,
    pub failed_count: u32,
}

/// Tracks the last-run record for one scraper.
pub struct StateTracker {
    path: PathBuf,
}

impl StateTracker {
    pub fn new(state_dir: &str, scraper_name: &str) -> Self {
        Self {
            path: PathBuf::from(state_dir).join(format!("{}.json", scraper_name)),
        }
    }

    /// Read the stored record, if any. Corrupt files read as absent.
    pub fn last_run(&self) -> Option<LastRun> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Persist the record for a finished run.
    pub fn record_run(&self, result: &PipelineResult) -> Result<()> {
        let record = LastRun {
            status: result.status.to_string(),
            completed_at: result
                .completed_at
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            downloaded_count: result.downloaded_count,
            archived_count: result.archived_count,
            rag_indexed_count: result.rag_indexed_count,
            failed_count: result.failed_count,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Internal(format!("create {}: {}", parent.display(), e)))?;
        }
        let rendered = serde_json::to_string_pretty(&record)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        std::fs::write(&self.path, rendered)
            .map_err(|e| AppError::Internal(format!("write {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PipelineStatus;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StateTracker::new(dir.path().to_str().unwrap(), "acme");
        assert!(tracker.last_run().is_none());

        let mut result = PipelineResult::new("acme");
        result.status = PipelineStatus::Completed;
        result.completed_at = Some("2024-01-15T00:00:00+00:00".to_string());
        result.downloaded_count = 3;
        result.archived_count = 3;
        tracker.record_run(&result).unwrap();

        let last = tracker.last_run().unwrap();
        assert_eq!(last.status, "completed");
        assert_eq!(last.downloaded_count, 3);
        assert_eq!(last.completed_at, "2024-01-15T00:00:00+00:00");
    }
}
