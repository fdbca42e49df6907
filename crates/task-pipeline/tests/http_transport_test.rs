//! Mock HTTP server tests for `HttpTransport` and the pool-aware client.
//!
//! Uses [`wiremock`] to emulate OpenAI-compatible `/chat/completions`
//! endpoints, so the full request/response path runs without a real backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use coordination::router::{EndpointPool, Tier};
use serde_json::json;
use task_pipeline::inference::TierSettings;
use task_pipeline::{ChatRequest, ChatTransport, HttpTransport, InferenceClient, TransportError};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> ChatRequest {
    ChatRequest {
        model: "coder".into(),
        system: Some("Reply with code only.".into()),
        prompt: "add two integers".into(),
        max_tokens: 256,
        temperature: 0.2,
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn complete_success_sends_messages_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "coder",
            "stream": false,
            "messages": [
                { "role": "system", "content": "Reply with code only." },
                { "role": "user", "content": "add two integers" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("def add(a, b): return a + b")))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Some("sk-test".into()));
    let text = transport.complete(&server.uri(), &request()).await.unwrap();
    assert_eq!(text, "def add(a, b): return a + b");
}

#[tokio::test]
async fn trailing_slash_address_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("x = 1")))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(None);
    let address = format!("{}/", server.uri());
    assert_eq!(transport.complete(&address, &request()).await.unwrap(), "x = 1");
}

#[tokio::test]
async fn server_error_maps_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let err = HttpTransport::new(None)
        .complete(&server.uri(), &request())
        .await
        .unwrap_err();
    match err {
        TransportError::Status { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "model loading");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_choices_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = HttpTransport::new(None)
        .complete(&server.uri(), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::InvalidResponse { .. }));
}

#[tokio::test]
async fn malformed_json_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = HttpTransport::new(None)
        .complete(&server.uri(), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::InvalidResponse { .. }));
}

#[tokio::test]
async fn client_fails_over_to_healthy_server() {
    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&down)
        .await;
    let up = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok = True")))
        .expect(1)
        .mount(&up)
        .await;

    let mut endpoints = HashMap::new();
    endpoints.insert(Tier::Generation, vec![down.uri(), up.uri()]);
    let pool = EndpointPool::new(endpoints, 2).shared();
    let mut tiers = HashMap::new();
    tiers.insert(
        Tier::Generation,
        TierSettings {
            model: "coder".into(),
            max_tokens: 256,
            temperature: 0.2,
        },
    );
    let client = InferenceClient::new(
        pool.clone(),
        Arc::new(HttpTransport::new(None)),
        tiers,
        Duration::from_secs(5),
    );

    assert_eq!(client.invoke(Tier::Generation, "p").await.unwrap(), "ok = True");
    let records = pool.snapshot(Tier::Generation);
    assert_eq!(records[0].consecutive_failures, 1);
    assert_eq!(records[1].consecutive_failures, 0);
}
