use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::{AgentError, ClaudeConfig, ClaudeLlmProvider, CompletionRequest, LlmProvider};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Seen {
    bodies: Arc<Mutex<Vec<Value>>>,
    keys: Arc<Mutex<Vec<String>>>,
}

async fn messages(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    seen.keys.lock().unwrap().push(key.clone());
    seen.bodies.lock().unwrap().push(body.clone());

    if key != "test-key" {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    if body["stream"] == json!(true) {
        let events = [
            json!({"type": "message_start", "message": {}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "<p>"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello</p>"}}),
            json!({"type": "message_stop"}),
        ];
        let body: String = events
            .iter()
            .map(|event| format!("event: {}\ndata: {}\n\n", event["type"].as_str().unwrap(), event))
            .collect();
        return ([("content-type", "text/event-stream")], body).into_response();
    }
    Json(json!({
        "id": "msg_1",
        "type": "message",
        "content": [{"type": "text", "text": "{\"completion\": \"more\"}"}]
    }))
    .into_response()
}

async fn serve() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/v1/messages", post(messages))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1"), seen)
}

fn provider(base: &str, key: &str) -> ClaudeLlmProvider {
    ClaudeLlmProvider::new(ClaudeConfig {
        api_key: key.into(),
        api_base: base.into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn complete_posts_messages_request() {
    let (base, seen) = serve().await;
    let request = CompletionRequest::new("claude-3-haiku-20240307", "continue this")
        .with_temperature(1.0)
        .with_max_tokens(1024);

    let text = provider(&base, "test-key").complete(&request).await.unwrap();
    assert_eq!(text, "{\"completion\": \"more\"}");

    let body = seen.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["model"], "claude-3-haiku-20240307");
    assert_eq!(body["max_tokens"], 1024);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"][0]["text"], "continue this");
    assert!(body.get("stream").is_none());
}

#[tokio::test]
async fn stream_yields_text_deltas() {
    let (base, _seen) = serve().await;
    let request = CompletionRequest::new("claude-3-sonnet-20240229", "write");
    let chunks: Vec<String> = provider(&base, "test-key")
        .stream(&request)
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec!["<p>".to_string(), "Hello</p>".to_string()]);
}

#[tokio::test]
async fn non_success_status_is_a_provider_error() {
    let (base, seen) = serve().await;
    let request = CompletionRequest::new("m", "p");
    let err = provider(&base, "wrong").complete(&request).await.unwrap_err();
    match err {
        AgentError::Provider(message) => assert!(message.contains("401")),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(*seen.keys.lock().unwrap(), vec!["wrong".to_string()]);
}
