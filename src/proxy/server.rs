//! HTTP server setup and configuration.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::retry::RetryPolicy;
use crate::config::Config;
use crate::providers::{GeminiClient, OllamaClient, ReplicateClient, SensayClient};

/// Response header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request correlation id (UUID v4), inserted by middleware.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub uuid::Uuid);

/// Shared application state. Everything here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub replicate: ReplicateClient,
    pub gemini: GeminiClient,
    pub ollama: OllamaClient,
    pub sensay: SensayClient,
    pub retry: RetryPolicy,
}

impl AppState {
    /// Build the provider clients from `config`, sharing one connection pool.
    pub fn from_config(config: Config) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            replicate: ReplicateClient::new(http_client.clone(), &config.replicate),
            gemini: GeminiClient::new(http_client.clone(), &config.gemini),
            ollama: OllamaClient::new(http_client.clone(), &config.ollama),
            sensay: SensayClient::new(http_client, &config.sensay),
            retry: RetryPolicy::from(&config.retry),
            config: Arc::new(config),
        })
    }
}

/// Tag the request with a fresh [`RequestId`] and echo it in the response.
async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId(uuid::Uuid::new_v4());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Browser frontends call the relay directly, so any origin is allowed.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(Duration::from_secs(86400))
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/replicate", post(handlers::replicate))
        .route("/api/gemini_functions", post(handlers::gemini_functions))
        .route("/api/chat", post(handlers::chat))
        .route("/api/ollama", post(handlers::ollama_generate))
        .route("/api/gemini-proxy", post(handlers::gemini_proxy))
        .route("/api/sensay-proxy", post(handlers::sensay_proxy))
        .route("/health", get(handlers::health))
        // State and middleware
        .with_state(state)
        .layer(middleware::from_fn(assign_request_id))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    tracing::info!(
        replicate = %config.replicate.url,
        gemini = %config.gemini.base_url,
        gemini_key = %config.gemini.key_source,
        ollama = %config.ollama.url,
        sensay = %config.sensay.base_url,
        max_retries = config.retry.max_retries,
        "Configured providers"
    );

    let state = AppState::from_config(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting llm-relay server");

    axum::serve(listener, app).await?;

    Ok(())
}
