//! Upstream provider clients.
//!
//! Each client owns a cloned `reqwest::Client` plus the immutable slice of
//! configuration it needs, and issues exactly one HTTP call per method. Retry
//! decisions live in `proxy::retry`; clients only classify failures.

pub mod gemini;
pub mod ollama;
pub mod replicate;
pub mod sensay;

use axum::http::StatusCode;
use serde::de::DeserializeOwned;

use crate::proxy::retry::Transient;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use replicate::ReplicateClient;
pub use sensay::SensayClient;

/// Longest slice of an upstream body quoted back in error messages.
const SNIPPET_CHARS: usize = 200;

/// Failure talking to an upstream provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connection, TLS or timeout failure; nothing usable came back.
    #[error("{0}")]
    Transport(#[source] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// Success status, but the body did not match the expected shape.
    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// Body was not JSON at all. Relayed to the caller, never retried.
    #[error("non-JSON response ({status}): {snippet}")]
    NonJson { status: StatusCode, snippet: String },

    /// The configured base URL cannot carry a request path.
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(String),
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        !matches!(
            self,
            ProviderError::NonJson { .. } | ProviderError::InvalidUrl(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err)
    }
}

/// Send a request and decode a JSON body, turning non-success statuses
/// into [`ProviderError::Status`].
async fn send_json<R: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<R, ProviderError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status { status, body });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
}

/// First [`SNIPPET_CHARS`] characters of `text`.
fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}
