//! Replicate predictions API client.
//!
//! Requests are sent with `Prefer: wait`, so a completed prediction comes
//! back in the same response and no polling is needed. The body is relayed
//! to the caller as-is; only `output` is inspected.

use axum::http::{header, StatusCode};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{snippet, ProviderError};
use crate::config::ReplicateConfig;

/// Client for `POST /v1/predictions`.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    http: Client,
    url: String,
    timeout: Duration,
}

/// A JSON reply from Replicate with its status, success or not.
#[derive(Debug, Clone)]
pub struct PredictionReply {
    pub status: StatusCode,
    pub body: Value,
}

/// Decoded shape of a prediction's `output` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Text(String),
    /// Token-streaming models return a list of string chunks.
    List(Vec<Value>),
    Other(Value),
}

impl PredictionReply {
    /// The `output` field, or `None` when absent or null.
    pub fn output(&self) -> Option<PredictionOutput> {
        self.body
            .get("output")
            .filter(|v| !v.is_null())
            .and_then(|v| PredictionOutput::deserialize(v).ok())
    }

    /// An OK reply with no output yet: the model instance is still booting.
    pub fn is_cold_start(&self) -> bool {
        self.status.is_success() && self.output().is_none()
    }
}

impl PredictionOutput {
    /// Short description for log lines.
    pub fn describe(&self) -> String {
        match self {
            PredictionOutput::Text(text) => format!("text ({} chars)", text.chars().count()),
            PredictionOutput::List(items) => format!("list ({} items)", items.len()),
            PredictionOutput::Other(value) => match value {
                Value::Object(map) => format!("object ({} keys)", map.len()),
                other => format!("scalar ({})", other),
            },
        }
    }
}

impl ReplicateClient {
    pub fn new(http: Client, config: &ReplicateConfig) -> Self {
        Self {
            http,
            url: config.url.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create a prediction and wait for it to finish.
    ///
    /// Any JSON reply is returned, whatever its status. A non-JSON body is
    /// reported as [`ProviderError::NonJson`].
    pub async fn create_prediction(
        &self,
        api_token: &str,
        payload: &Value,
    ) -> Result<PredictionReply, ProviderError> {
        let response = self
            .http
            .post(&self.url)
            .header(header::AUTHORIZATION, format!("Bearer {}", api_token))
            .header(header::CONTENT_TYPE, "application/json")
            .header("Prefer", "wait")
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Ok(PredictionReply { status, body }),
            Err(_) => Err(ProviderError::NonJson {
                status,
                snippet: snippet(&text),
            }),
        }
    }
}
