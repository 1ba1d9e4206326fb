//! Ollama daemon client (`/api/chat` and `/api/generate`, non-streaming).

use axum::http::header;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{send_json, ProviderError};
use crate::config::OllamaConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaOptions {
    pub temperature: f64,
}

/// `POST /api/chat` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,
    pub options: OllamaOptions,
}

/// `POST /api/generate` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaGenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: OllamaOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaChatResponse {
    #[serde(default)]
    pub message: Option<OllamaReplyMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaReplyMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaGenerateResponse {
    #[serde(default)]
    pub response: Option<String>,
}

/// Client for a local Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(http: Client, config: &OllamaConfig) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn chat(
        &self,
        request: &OllamaChatRequest,
    ) -> Result<OllamaChatResponse, ProviderError> {
        let builder = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .json(request);
        send_json(builder).await
    }

    pub async fn generate(
        &self,
        request: &OllamaGenerateRequest,
    ) -> Result<OllamaGenerateResponse, ProviderError> {
        let builder = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .json(request);
        send_json(builder).await
    }
}
