//! Metadata merge strategies.
//!
//! Combines scraper-provided [`DocumentMetadata`] with the parser's
//! extracted metadata map. Three strategies:
//! - `smart` (default): per field, pick the non-empty, more informative
//!   value; collections union with case-insensitive dedup; extras
//!   deep-merge
//! - `prefer_scraper` / `prefer_parser`: the named source wins a conflict,
//!   otherwise the other's value fills the gap

use std::str::FromStr;

use serde_json::Value;

use crate::types::{AppError, DocumentMetadata, Result};

/// Parser-metadata keys that map onto named [`DocumentMetadata`] fields.
/// Everything else lands in `extra`.
const MAPPED_KEYS: &[&str] = &[
    "title",
    "author",
    "creation_date",
    "page_count",
    "language",
    "description",
    "keywords",
    "tags",
];

/// How to resolve conflicts between scraper and parser metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    #[default]
    Smart,
    PreferScraper,
    PreferParser,
}

impl FromStr for MergeStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "smart" => Ok(Self::Smart),
            "prefer_scraper" => Ok(Self::PreferScraper),
            "prefer_parser" => Ok(Self::PreferParser),
            _ => Err(AppError::InvalidInput(format!(
                "Unknown metadata merge strategy: {}. Use: smart, prefer_scraper, prefer_parser",
                s
            ))),
        }
    }
}

fn merge_scalar(scraper: &str, parser: &str, strategy: MergeStrategy) -> String {
    match strategy {
        MergeStrategy::Smart => {
            // Non-empty wins; both non-empty -> the longer value.
            if scraper.is_empty() {
                parser.to_string()
            } else if parser.is_empty() || scraper.len() >= parser.len() {
                scraper.to_string()
            } else {
                parser.to_string()
            }
        }
        MergeStrategy::PreferScraper => {
            if scraper.is_empty() {
                parser.to_string()
            } else {
                scraper.to_string()
            }
        }
        MergeStrategy::PreferParser => {
            if parser.is_empty() {
                scraper.to_string()
            } else {
                parser.to_string()
            }
        }
    }
}

/// Union with case-insensitive dedup, preserving first-seen casing/order.
fn union_dedup(first: &[String], second: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for value in first.iter().chain(second.iter()) {
        let key = value.to_lowercase();
        if !value.is_empty() && seen.insert(key) {
            merged.push(value.clone());
        }
    }
    merged
}

fn merge_collection(
    scraper: &[String],
    parser: &[String],
    strategy: MergeStrategy,
) -> Vec<String> {
    match strategy {
        MergeStrategy::Smart => union_dedup(scraper, parser),
        MergeStrategy::PreferScraper => {
            if scraper.is_empty() {
                parser.to_vec()
            } else {
                scraper.to_vec()
            }
        }
        MergeStrategy::PreferParser => {
            if parser.is_empty() {
                scraper.to_vec()
            } else {
                parser.to_vec()
            }
        }
    }
}

/// Deep-merge `addition` into `base`. Nested maps merge recursively; on a
/// leaf conflict the base value wins.
fn deep_merge(base: &mut serde_json::Map<String, Value>, addition: &serde_json::Map<String, Value>) {
    for (key, value) in addition {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (Some(_), _) => {}
            (None, _) => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string_value(map: &serde_json::Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Merge parser-extracted metadata into scraper-provided metadata.
pub fn merge_metadata(
    scraper: &DocumentMetadata,
    parser: &serde_json::Map<String, Value>,
    strategy: MergeStrategy,
) -> DocumentMetadata {
    let mut merged = scraper.clone();

    merged.title = merge_scalar(&scraper.title, &string_value(parser, "title"), strategy);
    merged.author = merge_scalar(&scraper.author, &string_value(parser, "author"), strategy);
    merged.publication_date = merge_scalar(
        &scraper.publication_date,
        &string_value(parser, "creation_date"),
        strategy,
    );
    merged.language = merge_scalar(&scraper.language, &string_value(parser, "language"), strategy);
    merged.description = merge_scalar(
        &scraper.description,
        &string_value(parser, "description"),
        strategy,
    );

    let parser_pages = parser
        .get("page_count")
        .and_then(Value::as_u64)
        .map(|n| n as u32);
    merged.page_count = match strategy {
        MergeStrategy::PreferParser => parser_pages.or(scraper.page_count),
        _ => scraper.page_count.or(parser_pages),
    };

    merged.tags = merge_collection(&scraper.tags, &string_list(parser.get("tags")), strategy);
    merged.keywords = merge_collection(
        &scraper.keywords,
        &string_list(parser.get("keywords")),
        strategy,
    );

    // Unmapped parser keys deep-merge into extras; scraper extras win on
    // leaf conflicts.
    let mut parser_extras = serde_json::Map::new();
    for (key, value) in parser {
        if !MAPPED_KEYS.contains(&key.as_str()) {
            parser_extras.insert(key.clone(), value.clone());
        }
    }
    let mut extra: serde_json::Map<String, Value> =
        scraper.extra.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    deep_merge(&mut extra, &parser_extras);
    merged.extra = extra.into_iter().collect();

    merged
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scraper_meta() -> DocumentMetadata {
        let mut meta = DocumentMetadata::new("http://x/doc", "doc.pdf");
        meta.title = "Short".to_string();
        meta.organization = "ACME".to_string();
        meta.tags = vec!["Energy".to_string(), "Policy".to_string()];
        meta
    }

    fn parser_map(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("smart".parse::<MergeStrategy>().unwrap(), MergeStrategy::Smart);
        assert_eq!(
            "prefer_scraper".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::PreferScraper
        );
        assert!("best_effort".parse::<MergeStrategy>().is_err());
    }

    #[test]
    fn test_smart_prefers_longer_non_empty() {
        let parser = parser_map(&[("title", json!("A Much Longer Document Title"))]);
        let merged = merge_metadata(&scraper_meta(), &parser, MergeStrategy::Smart);
        assert_eq!(merged.title, "A Much Longer Document Title");

        // Scraper value longer -> scraper kept.
        let parser = parser_map(&[("title", json!("S"))]);
        let merged = merge_metadata(&scraper_meta(), &parser, MergeStrategy::Smart);
        assert_eq!(merged.title, "Short");
    }

    #[test]
    fn test_smart_fills_empty_fields() {
        let parser = parser_map(&[
            ("author", json!("Alice")),
            ("creation_date", json!("2024-01-15")),
            ("page_count", json!(9)),
        ]);
        let merged = merge_metadata(&scraper_meta(), &parser, MergeStrategy::Smart);
        assert_eq!(merged.author, "Alice");
        assert_eq!(merged.publication_date, "2024-01-15");
        assert_eq!(merged.page_count, Some(9));
        // Untouched scraper-only field survives.
        assert_eq!(merged.organization, "ACME");
    }

    #[test]
    fn test_prefer_scraper_wins_conflict() {
        let parser = parser_map(&[("title", json!("Parser Title Long Enough"))]);
        let merged = merge_metadata(&scraper_meta(), &parser, MergeStrategy::PreferScraper);
        assert_eq!(merged.title, "Short");

        // Gap still filled from parser.
        let mut scraper = scraper_meta();
        scraper.title = String::new();
        let merged = merge_metadata(&scraper, &parser, MergeStrategy::PreferScraper);
        assert_eq!(merged.title, "Parser Title Long Enough");
    }

    #[test]
    fn test_prefer_parser_wins_conflict() {
        let parser = parser_map(&[("title", json!("P"))]);
        let merged = merge_metadata(&scraper_meta(), &parser, MergeStrategy::PreferParser);
        assert_eq!(merged.title, "P");

        let empty_parser = parser_map(&[]);
        let merged = merge_metadata(&scraper_meta(), &empty_parser, MergeStrategy::PreferParser);
        assert_eq!(merged.title, "Short");
    }

    #[test]
    fn test_smart_tags_union_case_insensitive() {
        let parser = parser_map(&[("tags", json!(["energy", "Climate"]))]);
        let merged = merge_metadata(&scraper_meta(), &parser, MergeStrategy::Smart);
        assert_eq!(merged.tags, vec!["Energy", "Policy", "Climate"]);
    }

    #[test]
    fn test_unmapped_keys_land_in_extra() {
        let parser = parser_map(&[
            ("content_type", json!("application/pdf")),
            ("parsed_by", json!("docling_serve")),
        ]);
        let merged = merge_metadata(&scraper_meta(), &parser, MergeStrategy::Smart);
        assert_eq!(
            merged.extra.get("content_type"),
            Some(&json!("application/pdf"))
        );
        assert_eq!(merged.extra.get("parsed_by"), Some(&json!("docling_serve")));
    }

    #[test]
    fn test_extras_deep_merge_scraper_leaf_wins() {
        let mut scraper = scraper_meta();
        scraper.extra.insert(
            "nested".to_string(),
            json!({"kept": "scraper", "shared": "scraper"}),
        );
        let parser = parser_map(&[(
            "nested",
            json!({"shared": "parser", "added": "parser"}),
        )]);

        let merged = merge_metadata(&scraper, &parser, MergeStrategy::Smart);
        let nested = merged.extra.get("nested").unwrap();
        assert_eq!(nested["kept"], "scraper");
        assert_eq!(nested["shared"], "scraper");
        assert_eq!(nested["added"], "parser");
    }
}
