//! Error types for llm-relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Message shown to callers when the model could not be reached after all retries.
pub const MODEL_FAILURE_MESSAGE: &str =
    "We encountered an issue processing your request with the AI model. Please try again.";

/// Main error type for llm-relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Request body is required")]
    MissingBody,

    #[error("Request body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("{0}")]
    MissingParameter(String),

    #[error("{0}")]
    MissingCredential(String),

    #[error("Invalid JSON string for 'tools'")]
    InvalidToolsJson,

    #[error("No valid function declarations found in 'tools'")]
    NoValidTools,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Gemini request blocked due to: {reason}")]
    Blocked { reason: String, details: String },

    /// Non-OK upstream reply, relayed with the upstream status.
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: String,
        details: Option<String>,
    },

    /// Non-OK upstream reply whose error payload is passed back whole as
    /// `{"error", "status", "details"}`.
    #[error("{message}")]
    UpstreamPayload {
        status: StatusCode,
        message: String,
        details: serde_json::Value,
    },

    /// Every attempt against the model failed.
    #[error("{}", MODEL_FAILURE_MESSAGE)]
    ModelFailure { debug_info: String },

    #[error("{0}")]
    Provider(String),
}

impl Error {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingBody
            | Error::MalformedBody(_)
            | Error::MissingParameter(_)
            | Error::InvalidToolsJson
            | Error::NoValidTools
            | Error::BadRequest(_)
            | Error::Blocked { .. } => StatusCode::BAD_REQUEST,
            Error::MissingCredential(_) => StatusCode::UNAUTHORIZED,
            Error::Upstream { status, .. } | Error::UpstreamPayload { status, .. } => *status,
            Error::ModelFailure { .. } | Error::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Flat `{"error": ...}` body, the shape the frontend already reads
        let body = match &self {
            Error::Blocked { details, .. } => serde_json::json!({
                "error": self.to_string(),
                "details": details,
            }),
            Error::Upstream {
                details: Some(details),
                ..
            } => serde_json::json!({
                "error": self.to_string(),
                "details": details,
            }),
            Error::UpstreamPayload {
                status, details, ..
            } => serde_json::json!({
                "error": self.to_string(),
                "status": status.as_u16(),
                "details": details,
            }),
            Error::ModelFailure { debug_info } => serde_json::json!({
                "error": MODEL_FAILURE_MESSAGE,
                "debug_info": debug_info,
                "status": "error",
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}
