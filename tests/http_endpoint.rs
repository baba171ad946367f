//! HTTP model endpoint against a mock Messages API.

use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use transcript_docgen::client::{ChunkCallback, InvokeOptions, ModelClient, ModelClientBuilder, RetryPolicy};
use transcript_docgen::error_code::ProviderErrorKind;
use transcript_docgen::transport::{HttpEndpointConfig, HttpModelEndpoint, ModelEndpoint, ModelRequest};
use transcript_docgen::Error;

fn endpoint(url: &str) -> HttpModelEndpoint {
    HttpModelEndpoint::new(
        HttpEndpointConfig::new(url)
            .with_api_key(Some("test-key".to_string()))
            .with_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

fn client(url: &str, max_retries: u32) -> ModelClient {
    ModelClientBuilder::new(Arc::new(endpoint(url)))
        .model_id("test-model")
        .retry_policy(RetryPolicy::new(max_retries).with_backoff_base(Duration::from_millis(5)))
        .build()
}

fn sse(events: &[serde_json::Value]) -> String {
    events
        .iter()
        .map(|e| format!("event: {}\ndata: {}\n\n", e["type"].as_str().unwrap_or("message"), e))
        .collect()
}

#[tokio::test]
async fn test_invoke_posts_messages_body_and_joins_text_blocks() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "test-key")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({
            "model": "test-model",
            "max_tokens": 16000,
            "system": "be precise",
            "messages": [{ "role": "user", "content": "explain E42" }]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "content": [
                    { "type": "text", "text": "Restart " },
                    { "type": "text", "text": "the broker." }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client(&server.url(), 3);
    let opts = InvokeOptions::new()
        .system_prompt("be precise")
        .temperature(0.3)
        .max_tokens(16_000);
    let (text, usage) = client.invoke("explain E42", &opts).await.unwrap();

    assert_eq!(text, "Restart the broker.");
    assert_eq!(usage.output_tokens, ("Restart the broker.".len() / 4) as u64);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_errors_are_retried_then_surface() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"type":"error","error":{"type":"rate_limit_error","message":"Too many tokens"}}"#)
        .expect(3)
        .create_async()
        .await;

    let client = client(&server.url(), 3);
    let err = client.invoke("hi", &InvokeOptions::new()).await.unwrap_err();

    assert_eq!(err.provider_kind(), Some(ProviderErrorKind::Throttling));
    assert!(err.to_string().contains("Too many tokens"));
    assert_eq!(client.circuit_breaker_state().unwrap().failure_count, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_request_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .with_status(400)
        .with_body(r#"{"type":"error","error":{"type":"invalid_request_error","message":"max_tokens: too large"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client(&server.url(), 3);
    let err = client.invoke("hi", &InvokeOptions::new()).await.unwrap_err();

    assert_eq!(err.provider_kind(), Some(ProviderErrorKind::InvalidRequest));
    assert!(!err.is_retryable());
    assert_eq!(client.circuit_breaker_state().unwrap().failure_count, 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unstructured_server_error_maps_from_status() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/messages")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let endpoint = endpoint(&server.url());
    let err = endpoint
        .invoke(&ModelRequest::new("m", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.provider_kind(), Some(ProviderErrorKind::ServiceUnavailable));
    assert!(err.to_string().contains("HTTP 503"));
}

#[tokio::test]
async fn test_streaming_delivers_deltas_to_callback() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("accept", "text/event-stream")
        .match_body(Matcher::PartialJson(json!({ "stream": true })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&[
            json!({ "type": "message_start", "message": { "id": "msg_1" } }),
            json!({ "type": "content_block_delta", "delta": { "type": "text_delta", "text": "# Guide" } }),
            json!({ "type": "ping" }),
            json!({ "type": "content_block_delta", "delta": { "type": "text_delta", "text": "\n\nStep one." } }),
            json!({ "type": "message_stop" }),
        ]))
        .create_async()
        .await;

    let client = client(&server.url(), 3);
    let seen = Mutex::new(Vec::new());
    let callback = |chunk: &str| seen.lock().unwrap().push(chunk.to_string());
    let (text, usage) = client
        .invoke_streaming("write", &InvokeOptions::new(), Some(&callback as ChunkCallback<'_>))
        .await
        .unwrap();

    assert_eq!(text, "# Guide\n\nStep one.");
    assert_eq!(*seen.lock().unwrap(), vec!["# Guide".to_string(), "\n\nStep one.".to_string()]);
    assert_eq!(client.total_usage(), usage);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_stream_error_event_fails_the_call() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&[
            json!({ "type": "content_block_delta", "delta": { "text": "partial" } }),
            json!({ "type": "error", "error": { "type": "overloaded_error", "message": "Overloaded" } }),
        ]))
        .create_async()
        .await;

    let client = client(&server.url(), 3);
    let err = client
        .invoke_streaming("write", &InvokeOptions::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Provider { .. }));
    assert_eq!(err.provider_kind(), Some(ProviderErrorKind::ServiceUnavailable));
    // Nothing is accounted for a failed stream.
    assert_eq!(client.total_usage().total(), 0);
}
