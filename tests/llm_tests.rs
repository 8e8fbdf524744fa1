//! Wire-level tests for the LLM and embedding clients against HTTP doubles.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use landfall::embedding::{ApiEmbeddingClient, EmbeddingClient, OllamaEmbeddingClient};
use landfall::llm::{ApiLlmClient, ChatMessage, LlmClient, OllamaLlmClient, ResponseFormat};

// ============================================================================
// Embedding: Ollama native
// ============================================================================

#[tokio::test]
async fn ollama_embed_posts_model_and_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": "nomic-embed-text",
            "input": ["alpha", "beta"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2], [0.3, 0.4]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(&server.uri(), "nomic-embed-text", 768, 30);
    let result = client
        .embed(&["alpha".to_string(), "beta".to_string()])
        .await
        .unwrap();

    assert_eq!(result.embeddings.len(), 2);
    assert_eq!(result.embeddings[0], vec![0.1, 0.2]);
    assert_eq!(result.dimensions, 2);
    assert_eq!(result.model, "nomic-embed-text");
}

#[tokio::test]
async fn ollama_embed_missing_embeddings_key_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(&server.uri(), "m", 768, 30);
    let err = client.embed(&["x".to_string()]).await.unwrap_err();
    assert!(err.to_string().contains("embeddings"));
}

#[tokio::test]
async fn ollama_liveness_uses_api_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(&server.uri(), "m", 768, 30);
    assert!(client.test_connection().await);
}

// ============================================================================
// Embedding: OpenAI-compatible
// ============================================================================

#[tokio::test]
async fn api_embed_sends_bearer_and_restores_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"embedding": [0.9], "index": 1},
                {"embedding": [0.1], "index": 0}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiEmbeddingClient::new(&server.uri(), "text-embed", "sk-test", 768, 30);
    let result = client
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    // Out-of-order response re-sorted by index.
    assert_eq!(result.embeddings[0], vec![0.1]);
    assert_eq!(result.embeddings[1], vec![0.9]);
}

#[tokio::test]
async fn api_embed_http_error_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = ApiEmbeddingClient::new(&server.uri(), "m", "", 768, 30);
    assert!(client.embed(&["x".to_string()]).await.is_err());
}

// ============================================================================
// LLM: Ollama native
// ============================================================================

#[tokio::test]
async fn ollama_chat_round_trip_with_json_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.1:8b",
            "stream": false,
            "format": "json",
            "options": {"num_predict": 256}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "message": {"role": "assistant", "content": "{\"title\": \"T\"}"},
            "done_reason": "stop"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaLlmClient::new(&server.uri(), "llama3.1:8b", 30);
    let result = client
        .chat(
            &[ChatMessage::user("extract")],
            Some(ResponseFormat::Json),
            Some(256),
        )
        .await
        .unwrap();

    assert_eq!(result.content, "{\"title\": \"T\"}");
    assert_eq!(result.finish_reason, "stop");
    assert_eq!(result.model, "llama3.1:8b");
}

// ============================================================================
// LLM: OpenAI-compatible
// ============================================================================

#[tokio::test]
async fn api_chat_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [
                {"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}
            ]
        })))
        .mount(&server)
        .await;

    let client = ApiLlmClient::new(&server.uri(), "gpt-4o-mini", "sk-test", 30);
    let result = client
        .chat(
            &[ChatMessage::system("s"), ChatMessage::user("u")],
            Some(ResponseFormat::Json),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.content, "hello");
    assert_eq!(result.model, "gpt-4o-mini");
}

#[tokio::test]
async fn api_chat_empty_choices_is_explicit_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"model": "m", "choices": []})),
        )
        .mount(&server)
        .await;

    let client = ApiLlmClient::new(&server.uri(), "m", "", 30);
    let err = client
        .chat(&[ChatMessage::user("u")], None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no choices"));
}
