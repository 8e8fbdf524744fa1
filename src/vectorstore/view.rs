//! Compatibility VIEW over `document_chunks`.
//!
//! Adapts the partitioned chunk table to the schema an external RAG
//! consumer expects for pgvector queries:
//! - `id`: deterministic UUID derived from source/filename/chunk_index/id
//! - `namespace`: the `source` column renamed
//! - `embedding`: passed through
//! - `metadata`: original metadata merged with a `text` key holding content
//! - `created_at`: passed through

use crate::types::{AppError, Result};

/// Validate a view identifier: alphanumeric, underscore, and hyphen only.
pub(crate) fn validate_view_name(view_name: &str) -> Result<()> {
    let valid = !view_name.is_empty()
        && view_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(AppError::InvalidInput(format!(
            "Invalid view name: {:?}. Only alphanumeric, underscore, and hyphen allowed.",
            view_name
        )));
    }
    Ok(())
}

/// Render the CREATE OR REPLACE VIEW statement for a validated name.
pub(crate) fn compat_view_sql(view_name: &str) -> Result<String> {
    validate_view_name(view_name)?;
    Ok(format!(
        r#"CREATE OR REPLACE VIEW "{}" AS
        SELECT
            md5(COALESCE(source, '') || '/' || COALESCE(filename, '') || '/'
                || COALESCE(chunk_index::text, '') || '/' || COALESCE(id::text, ''))::uuid AS id,
            source AS namespace,
            embedding,
            metadata || jsonb_build_object('text', content) AS metadata,
            created_at
        FROM document_chunks"#,
        view_name
    ))
}
