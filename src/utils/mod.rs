//! Shared helpers: filename templating and small file utilities.

pub mod config;

use crate::types::{AppError, DocumentMetadata, Result};

/// Placeholders accepted by the canonical-filename template.
const TEMPLATE_PLACEHOLDERS: &[&str] = &["title", "organization", "date", "type", "filename"];

/// Validate a filename template: every `{placeholder}` must be a known name
/// and braces must be balanced.
pub fn validate_filename_template(template: &str) -> Result<()> {
    if template.trim().is_empty() {
        return Err(AppError::Configuration(
            "filename template must not be empty".to_string(),
        ));
    }
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let tail = &rest[open + 1..];
        let close = tail.find('}').ok_or_else(|| {
            AppError::Configuration(format!("unbalanced '{{' in template: {}", template))
        })?;
        let name = &tail[..close];
        if !TEMPLATE_PLACEHOLDERS.contains(&name) {
            return Err(AppError::Configuration(format!(
                "unknown placeholder '{{{}}}' in template (allowed: {})",
                name,
                TEMPLATE_PLACEHOLDERS.join(", ")
            )));
        }
        rest = &tail[close + 1..];
    }
    if rest.contains('}') {
        return Err(AppError::Configuration(format!(
            "unbalanced '}}' in template: {}",
            template
        )));
    }
    Ok(())
}

/// Render the canonical filename for a document from a template over its
/// merged metadata. Empty fields render as empty strings and the result is
/// cleaned up for filesystem use.
pub fn generate_filename_from_template(
    template: &str,
    metadata: &DocumentMetadata,
) -> Result<String> {
    validate_filename_template(template)?;

    let date = metadata
        .publication_date
        .split('T')
        .next()
        .unwrap_or("")
        .to_string();
    let stem = metadata
        .filename
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or_else(|| metadata.filename.clone());

    let rendered = template
        .replace("{title}", &metadata.title)
        .replace("{organization}", &metadata.organization)
        .replace("{date}", &date)
        .replace("{type}", &metadata.document_type)
        .replace("{filename}", &stem);

    Ok(sanitize_filename(&rendered))
}

/// Strip path separators and control characters, collapse repeated
/// whitespace, and trim stray separator runs left by empty placeholders.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c == '-' || c == ' ')
        .to_string()
}
