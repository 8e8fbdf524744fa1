//! Wire-level tests for the docling-serve parser, the hybrid chunker, and
//! the Tika client against HTTP doubles.

use std::io::Write;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use landfall::backends::ParserBackend;
use landfall::backends::parsers::DoclingServeParser;
use landfall::chunking::{Chunker, HybridChunker};
use landfall::clients::TikaClient;
use landfall::types::DocumentMetadata;

fn temp_pdf() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    file.write_all(b"%PDF-1.4 fake").unwrap();
    file
}

// ============================================================================
// docling-serve parser
// ============================================================================

#[tokio::test]
async fn docling_parse_writes_markdown_sibling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/convert/file"))
        .and(query_param("to_formats", "md"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document": {
                "md_content": "# Converted\n\nbody",
                "metadata": {"title": "Doc Title", "author": "Alice"},
                "page_count": 5
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = temp_pdf();
    let parser = DoclingServeParser::new(&server.uri(), 30);
    let outcome = parser.parse(file.path(), &DocumentMetadata::default()).await;

    match outcome {
        landfall::types::ParserOutcome::Success {
            content_path,
            metadata,
            parser_name,
        } => {
            assert_eq!(parser_name, "docling_serve");
            assert!(content_path.to_string_lossy().ends_with(".md"));
            let written = std::fs::read_to_string(&content_path).unwrap();
            assert_eq!(written, "# Converted\n\nbody");
            assert_eq!(metadata.get("title"), Some(&Value::from("Doc Title")));
            assert_eq!(metadata.get("author"), Some(&Value::from("Alice")));
            assert_eq!(metadata.get("page_count"), Some(&Value::from(5)));
            std::fs::remove_file(content_path).ok();
        }
        landfall::types::ParserOutcome::Failure { error, .. } => panic!("parse failed: {}", error),
    }
}

#[tokio::test]
async fn docling_empty_markdown_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/convert/file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document": {"md_content": ""}
        })))
        .mount(&server)
        .await;

    let file = temp_pdf();
    let parser = DoclingServeParser::new(&server.uri(), 30);
    let outcome = parser.parse(file.path(), &DocumentMetadata::default()).await;
    assert!(!outcome.is_success());
    assert!(outcome.error().unwrap().contains("empty markdown"));
}

#[tokio::test]
async fn docling_http_error_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/convert/file"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let file = temp_pdf();
    let parser = DoclingServeParser::new(&server.uri(), 30);
    let outcome = parser.parse(file.path(), &DocumentMetadata::default()).await;
    assert!(!outcome.is_success());
    assert!(outcome.error().unwrap().contains("HTTP error"));
}

#[tokio::test]
async fn docling_health_endpoint_drives_availability() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    assert!(DoclingServeParser::new(&server.uri(), 30).is_available().await);
    assert!(!DoclingServeParser::new("", 30).is_available().await);
}

// ============================================================================
// Hybrid chunker
// ============================================================================

#[tokio::test]
async fn hybrid_chunker_uses_endpoint_indices_and_headings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chunk/hybrid/file"))
        .and(query_param("chunking_max_tokens", "128"))
        .and(query_param("chunking_include_raw_text", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chunks": [
                {
                    "text": "first chunk",
                    "headings": ["Intro", "Background"],
                    "num_tokens": 12,
                    "chunk_index": 0
                },
                {
                    "text": "   ",
                    "raw_text": "raw fallback chunk",
                    "headings": [],
                    "num_tokens": 7,
                    "chunk_index": 1
                }
            ]
        })))
        .mount(&server)
        .await;

    let chunker = HybridChunker::new(128, 16, &server.uri(), 30).unwrap();
    let mut metadata = serde_json::Map::new();
    metadata.insert("filename".to_string(), Value::from("doc.pdf"));
    let chunks = chunker.chunk("# Intro\nsome body text", &metadata).await;

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, "first chunk");
    assert_eq!(chunks[0].index, 0);
    assert_eq!(
        chunks[0].metadata.get("heading_context"),
        Some(&Value::from("Background"))
    );
    assert_eq!(chunks[0].metadata.get("num_tokens"), Some(&Value::from(12)));
    assert_eq!(
        chunks[0].metadata.get("chunker"),
        Some(&Value::from("docling_hybrid"))
    );
    // Blank `text` falls back to `raw_text`.
    assert_eq!(chunks[1].content, "raw fallback chunk");
}

#[tokio::test]
async fn hybrid_chunker_falls_back_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chunk/hybrid/file"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let chunker = HybridChunker::new(4, 1, &server.uri(), 30).unwrap();
    let chunks = chunker
        .chunk("one two three four five six", &serde_json::Map::new())
        .await;

    // Fixed-strategy fallback produced word-window chunks.
    assert!(!chunks.is_empty());
    assert!(chunks[0].metadata.get("chunker").is_none());
    assert!(chunks[0].metadata.contains_key("word_start"));
}

#[tokio::test]
async fn hybrid_chunker_falls_back_on_zero_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chunk/hybrid/file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"chunks": []})))
        .mount(&server)
        .await;

    let chunker = HybridChunker::new(4, 1, &server.uri(), 30).unwrap();
    let chunks = chunker
        .chunk("alpha beta gamma delta", &serde_json::Map::new())
        .await;
    assert!(!chunks.is_empty());
    assert!(chunks[0].metadata.contains_key("word_start"));
}

// ============================================================================
// Tika client
// ============================================================================

#[tokio::test]
async fn tika_text_and_metadata_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/tika"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Extracted plain text"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/meta"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dc:title": "Spreadsheet",
            "meta:page-count": "4",
            "Content-Type": "application/vnd.ms-excel",
            "X-Parsed-By": "org.apache.tika.parser.DefaultParser"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/detect/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string("application/pdf\n"))
        .mount(&server)
        .await;

    let file = temp_pdf();
    let client = TikaClient::new(&server.uri(), 30);

    assert_eq!(
        client.extract_text(file.path()).await.unwrap(),
        "Extracted plain text"
    );

    let metadata = client.extract_metadata(file.path()).await.unwrap();
    assert_eq!(metadata.get("title"), Some(&Value::from("Spreadsheet")));
    assert_eq!(metadata.get("page_count"), Some(&Value::from(4)));
    assert_eq!(
        metadata.get("content_type"),
        Some(&Value::from("application/vnd.ms-excel"))
    );
    assert!(!metadata.contains_key("X-Parsed-By"));

    assert_eq!(
        client.detect_mime_type(file.path()).await.unwrap(),
        "application/pdf"
    );
}
