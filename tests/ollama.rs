//! Integration tests for the Ollama endpoints (/api/chat and /api/ollama).

use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use llm_relay::config::Config;
use llm_relay::proxy::normalize::OLLAMA_FALLBACK;
use llm_relay::proxy::{create_router, AppState};

fn test_app(ollama_url: String) -> axum::Router {
    let mut config = Config::default();
    config.ollama.url = ollama_url;
    create_router(AppState::from_config(config).expect("build app state"))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn parse_body(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or_default();
    (status, json)
}

#[tokio::test]
async fn test_chat_returns_assistant_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({
            "model": "llama3",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false,
            "options": {"temperature": 0.7}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "hello"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(server.uri());
    let response = app
        .oneshot(post(
            "/api/chat",
            r#"{"messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({"message": {"role": "assistant", "content": "hello"}})
    );
}

#[tokio::test]
async fn test_chat_defaults_role_model_and_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({
            "model": "mistral",
            "messages": [{"role": "user", "content": ""}],
            "stream": false,
            "options": {"temperature": 0.2}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(server.uri());
    let response = app
        .oneshot(post(
            "/api/chat",
            r#"{"messages":[{}],"model":"mistral","temperature":0.2}"#,
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"]["content"], OLLAMA_FALLBACK);
}

#[tokio::test]
async fn test_chat_without_messages_returns_400() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    for body in [r#"{"messages": []}"#, r#"{"model": "llama3"}"#, ""] {
        let app = test_app(server.uri());
        let response = app.oneshot(post("/api/chat", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {:?}", body);
    }
}

#[tokio::test]
async fn test_chat_relays_upstream_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string("{\"error\":\"model 'llama3' not found\"}"),
        )
        .mount(&server)
        .await;

    let app = test_app(server.uri());
    let response = app
        .oneshot(post(
            "/api/chat",
            r#"{"messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Error from Ollama API: 404"));
}

#[tokio::test]
async fn test_generate_returns_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({
            "model": "llama3",
            "prompt": "Why is the sky blue?",
            "stream": false,
            "options": {"temperature": 0.3}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3",
            "response": "Rayleigh scattering.",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(server.uri());
    let response = app
        .oneshot(post(
            "/api/ollama",
            r#"{"input":{"query":"Why is the sky blue?","temperature":0.3}}"#,
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({"id": "ollama-response", "status": "succeeded", "output": "Rayleigh scattering."})
    );
}

#[tokio::test]
async fn test_generate_missing_response_uses_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
        .mount(&server)
        .await;

    let app = test_app(server.uri());
    let response = app
        .oneshot(post("/api/ollama", r#"{"input":{"query":"hi"}}"#))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"], OLLAMA_FALLBACK);
}

#[tokio::test]
async fn test_generate_connection_failure_returns_500() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let app = test_app(format!("http://127.0.0.1:{}", port));
    let response = app
        .oneshot(post("/api/ollama", r#"{"input":{"query":"hi"}}"#))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Error communicating with Ollama"));
}

#[tokio::test]
async fn test_generate_empty_body_returns_400() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = test_app(server.uri());
    let response = app.oneshot(post("/api/ollama", "{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
