//! HTTP adapter behavior against a mock server: response parsing, status
//! classification, and timeout mapping.

use std::time::Duration;

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchyard::SwitchyardError;
use switchyard::core::request::{OperationClass, OperationRequest};
use switchyard::providers::{
    AnthropicAdapter, GeminiAdapter, OpenAiAdapter, invocation_retryable,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn request() -> OperationRequest {
    OperationRequest::new("u1", OperationClass::Generate, "say hi")
}

// =============================================================================
// Anthropic
// =============================================================================

#[tokio::test]
async fn anthropic_parses_messages_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "key-123"))
        .and(body_partial_json(serde_json::json!({
            "messages": [{"role": "user", "content": "say hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"type": "text", "text": "hi there"}],
            "model": "claude-sonnet-4-20250514"
        })))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::with_base_url("key-123", server.uri()).unwrap();
    let response = adapter
        .invoke(&request(), "claude-sonnet-4-20250514", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(response.output, "hi there");
    assert_eq!(response.model, "claude-sonnet-4-20250514");
}

#[tokio::test]
async fn anthropic_auth_failure_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::with_base_url("bad-key", server.uri()).unwrap();
    let err = adapter
        .invoke(&request(), "claude-sonnet-4-20250514", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchyardError::ProviderAuth { .. }));
    assert!(!invocation_retryable(&err));
}

#[tokio::test]
async fn anthropic_rate_limit_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::with_base_url("key", server.uri()).unwrap();
    let err = adapter
        .invoke(&request(), "claude-sonnet-4-20250514", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchyardError::RateLimited { .. }));
    assert!(invocation_retryable(&err));
}

#[tokio::test]
async fn anthropic_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::with_base_url("key", server.uri()).unwrap();
    let err = adapter
        .invoke(&request(), "claude-sonnet-4-20250514", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SwitchyardError::ProviderApi {
            status_code: Some(503),
            ..
        }
    ));
    assert!(invocation_retryable(&err));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"content": [], "model": "m"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::with_base_url("key", server.uri()).unwrap();
    let err = adapter
        .invoke(
            &request(),
            "claude-sonnet-4-20250514",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchyardError::ProviderTimeout { .. }));
    assert!(invocation_retryable(&err));
}

#[tokio::test]
async fn probe_reports_reachability() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::with_base_url("key", server.uri()).unwrap();
    assert!(adapter.probe().await);
}

// =============================================================================
// OpenAI
// =============================================================================

#[tokio::test]
async fn openai_parses_chat_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer key-456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hello!"}}],
            "model": "gpt-4o"
        })))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::with_base_url("key-456", server.uri()).unwrap();
    let response = adapter.invoke(&request(), "gpt-4o", TIMEOUT).await.unwrap();
    assert_eq!(response.output, "hello!");
    assert_eq!(response.model, "gpt-4o");
}

#[tokio::test]
async fn openai_malformed_body_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::with_base_url("key", server.uri()).unwrap();
    let err = adapter.invoke(&request(), "gpt-4o", TIMEOUT).await.unwrap_err();
    match err {
        SwitchyardError::ProviderApi { message, .. } => {
            assert!(message.contains("parse"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// Gemini
// =============================================================================

#[tokio::test]
async fn gemini_parses_generate_content_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [
                {"content": {"parts": [{"text": "bonjour"}], "role": "model"}}
            ]
        })))
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::with_base_url("key-789", server.uri()).unwrap();
    let response = adapter
        .invoke(&request(), "gemini-2.0-flash", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(response.output, "bonjour");
}

#[tokio::test]
async fn gemini_empty_candidates_yield_empty_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": []
        })))
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::with_base_url("key", server.uri()).unwrap();
    let response = adapter
        .invoke(&request(), "gemini-2.0-flash", TIMEOUT)
        .await
        .unwrap();
    assert!(response.output.is_empty());
}
