//! HTTP request handlers.
//!
//! Bodies are taken as raw bytes and validated here rather than through
//! axum's `Json` extractor, so every endpoint reports a missing or empty body
//! the same way before any upstream call is made.

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::normalize::{
    normalize_gemini, normalize_gemini_chat, normalize_ollama_chat, normalize_ollama_generate,
    partial_failure, GeminiOutcome,
};
use super::retry::{retry_with_backoff, Attempt, RetryOutcome, RetryResult};
use super::server::{AppState, RequestId};
use super::tools::translate_tools;
use super::types::{
    ChatCompletionResponse, ChatReply, ChatRequest, Envelope, FunctionCallRequest,
    GeminiChatRequest, GenerateRequest, SensayProxyRequest, DEFAULT_CHAT_MAX_TOKENS,
    DEFAULT_TEMPERATURE,
};
use crate::config::ApiKey;
use crate::error::Error;
use crate::providers::gemini::{GenerateContentRequest, GenerationConfig};
use crate::providers::ollama::{
    OllamaChatRequest, OllamaGenerateRequest, OllamaMessage, OllamaOptions,
};
use crate::providers::replicate::PredictionReply;
use crate::providers::sensay::SensayChatRequest;
use crate::providers::ProviderError;

/// Request header carrying the caller's Replicate token.
pub const REPLICATE_TOKEN_HEADER: &str = "x-replicate-api-token";
/// Request header carrying the caller's Gemini key.
pub const GEMINI_KEY_HEADER: &str = "x-gemini-api-key";
/// Request header carrying the caller's Sensay organization secret.
pub const SENSAY_KEY_HEADER: &str = "x-sensay-api-key";
/// Request header naming the Sensay user the chat belongs to.
pub const SENSAY_USER_HEADER: &str = "x-user-id";

/// Parse a request body, rejecting empty input (`""`, `null`, `{}`, `[]`).
fn parse_body(body: &[u8]) -> Result<Value, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::MissingBody);
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| Error::MalformedBody(e.to_string()))?;

    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if empty {
        return Err(Error::MissingBody);
    }

    Ok(value)
}

/// Parse a non-empty body into an endpoint's request type.
fn parse_request<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    let value = parse_body(body)?;
    serde_json::from_value(value).map_err(|e| Error::BadRequest(e.to_string()))
}

/// A trimmed, non-empty header value.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The caller's Gemini key, falling back to the server-side one.
fn gemini_key(state: &AppState, headers: &HeaderMap) -> Option<ApiKey> {
    header_value(headers, GEMINI_KEY_HEADER)
        .map(ApiKey::from)
        .or_else(|| state.config.gemini.api_key.clone())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn envelope_id(prefix: &str) -> String {
    format!("{}-{}", prefix, chrono::Utc::now().timestamp())
}

/// Map an Ollama failure: upstream statuses are relayed, everything else is a 500.
fn ollama_error(err: ProviderError, context: &str) -> Error {
    match err {
        ProviderError::Status { status, body } => Error::Upstream {
            status,
            message: format!("Error from Ollama API: {} {}", status.as_u16(), body),
            details: None,
        },
        other => Error::Provider(format!("{}: {}", context, other)),
    }
}

/// Map a Sensay failure. Error replies are relayed with their status and
/// payload; a non-JSON payload is wrapped as `{"message": <text>}`.
fn sensay_error(err: ProviderError) -> Error {
    match err {
        ProviderError::Status { status, body } => {
            let details = serde_json::from_str::<Value>(&body)
                .unwrap_or_else(|_| serde_json::json!({ "message": body }));
            let message = details
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("Error from Sensay API")
                .to_string();
            Error::UpstreamPayload {
                status,
                message,
                details,
            }
        }
        other => Error::Provider(format!("Error communicating with Sensay API: {}", other)),
    }
}

/// Handle POST /api/replicate
///
/// Relays the body to Replicate and the reply back, retrying while the
/// model is cold (OK status, null output). Successful replies are answered
/// with 200; error statuses are relayed as-is.
pub async fn replicate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    let payload = parse_body(&body)?;
    let api_token = header_value(&headers, REPLICATE_TOKEN_HEADER).ok_or_else(|| {
        Error::MissingCredential("Replicate API token is required".to_string())
    })?;

    tracing::info!(
        request_id = %request_id.0,
        url = %state.replicate.url(),
        "Forwarding request to Replicate"
    );

    let client = &state.replicate;
    let payload = &payload;
    let api_token = api_token.as_str();

    let outcome: RetryOutcome<PredictionReply, ProviderError> =
        retry_with_backoff(&state.retry, |attempt| async move {
            client
                .create_prediction(api_token, payload)
                .await
                .map(|reply| {
                    match reply.output() {
                        Some(output) => tracing::debug!(
                            attempt,
                            status = %reply.status,
                            output = %output.describe(),
                            "Replicate returned output"
                        ),
                        None => tracing::debug!(
                            attempt,
                            status = %reply.status,
                            "Replicate returned no output"
                        ),
                    }
                    if reply.is_cold_start() {
                        Attempt::Empty(reply)
                    } else {
                        Attempt::Ready(reply)
                    }
                })
        })
        .await;

    match outcome.result {
        RetryResult::Success(reply) | RetryResult::ExhaustedEmpty(reply) => {
            // Error statuses are relayed; any success (201 included) becomes 200
            let status = if reply.status.is_success() {
                StatusCode::OK
            } else {
                tracing::error!(
                    request_id = %request_id.0,
                    status = %reply.status,
                    body = %reply.body,
                    "Replicate returned error"
                );
                reply.status
            };
            Ok((status, Json(reply.body)).into_response())
        }
        RetryResult::Failed(ProviderError::NonJson { status, snippet }) => {
            tracing::error!(request_id = %request_id.0, status = %status, "Non-JSON response from Replicate");
            Err(Error::Upstream {
                status,
                message: format!("Invalid response from Replicate API: {}...", snippet),
                details: None,
            })
        }
        RetryResult::Failed(err) => {
            tracing::error!(
                request_id = %request_id.0,
                attempts = outcome.attempts,
                error = %err,
                "Failed to reach Replicate"
            );
            Err(Error::Provider(format!(
                "Error communicating with Replicate API: {}",
                err
            )))
        }
    }
}

/// Handle POST /api/gemini_functions
pub async fn gemini_functions(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Envelope>, Error> {
    let request: FunctionCallRequest = parse_request(&body)?;

    let api_key = gemini_key(&state, &headers).ok_or_else(|| {
        Error::MissingCredential(
            "Gemini API key is required (set via header or GEMINI_API_KEY env var)".to_string(),
        )
    })?;

    let query = request
        .query
        .as_deref()
        .filter(|q| !q.is_empty())
        .ok_or_else(|| Error::MissingParameter("Parameter 'query' is required".to_string()))?;
    let tools = request.tools.as_ref().filter(|t| !is_blank(t)).ok_or_else(|| {
        Error::MissingParameter("Parameter 'tools' (JSON string) is required".to_string())
    })?;

    let declarations = translate_tools(tools)?;
    let model = request
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.gemini.default_model.clone());
    let generation_config = GenerationConfig {
        temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_output_tokens: request.max_output_tokens(),
        top_p: request.top_p,
    };

    tracing::info!(
        request_id = %request_id.0,
        model = %model,
        query_chars = query.chars().count(),
        tools = declarations.len(),
        key = %api_key.masked(),
        "Requesting Gemini function call"
    );

    let generate = GenerateContentRequest::function_calling(query, declarations, generation_config);

    let client = &state.gemini;
    let generate = &generate;
    let model = model.as_str();
    let key = api_key.expose_secret();

    let outcome: RetryOutcome<GeminiOutcome, ProviderError> =
        retry_with_backoff(&state.retry, |attempt| async move {
            client
                .generate_content(key, model, generate)
                .await
                .map(|response| match normalize_gemini(&response, &envelope_id("gemini-func")) {
                    GeminiOutcome::Empty => {
                        tracing::debug!(attempt, "Gemini returned an empty response");
                        Attempt::Empty(GeminiOutcome::Empty)
                    }
                    other => Attempt::Ready(other),
                })
        })
        .await;

    match outcome.result {
        RetryResult::Success(GeminiOutcome::Envelope(envelope)) => {
            tracing::info!(
                request_id = %request_id.0,
                attempts = outcome.attempts,
                "Gemini response processed"
            );
            Ok(Json(envelope))
        }
        RetryResult::Success(GeminiOutcome::Blocked { reason, details }) => {
            tracing::warn!(request_id = %request_id.0, reason = %reason, "Gemini request blocked");
            Err(Error::Blocked { reason, details })
        }
        RetryResult::Success(GeminiOutcome::Empty) | RetryResult::ExhaustedEmpty(_) => {
            tracing::warn!(
                request_id = %request_id.0,
                attempts = outcome.attempts,
                "Gemini kept returning empty responses"
            );
            Ok(Json(partial_failure(&envelope_id("gemini-func"))))
        }
        RetryResult::Failed(err) => {
            tracing::error!(
                request_id = %request_id.0,
                attempts = outcome.attempts,
                error = %err,
                "Gemini call failed"
            );
            Err(Error::ModelFailure {
                debug_info: err.to_string(),
            })
        }
    }
}

/// Handle POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<ChatReply>, Error> {
    let request: ChatRequest = parse_request(&body)?;
    if request.messages.is_empty() {
        return Err(Error::MissingParameter("No messages provided".to_string()));
    }

    let ollama_request = OllamaChatRequest {
        model: request
            .model
            .clone()
            .unwrap_or_else(|| state.config.ollama.default_model.clone()),
        messages: request
            .messages
            .iter()
            .map(|m| OllamaMessage {
                role: m.role().to_string(),
                content: m.content().to_string(),
            })
            .collect(),
        stream: false,
        options: OllamaOptions {
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        },
    };

    tracing::info!(
        request_id = %request_id.0,
        model = %ollama_request.model,
        messages = ollama_request.messages.len(),
        "Sending chat request to Ollama"
    );

    let response = state.ollama.chat(&ollama_request).await.map_err(|e| {
        tracing::error!(request_id = %request_id.0, error = %e, "Ollama chat failed");
        ollama_error(e, "Error in chat endpoint")
    })?;

    Ok(Json(normalize_ollama_chat(&response)))
}

/// Handle POST /api/ollama
pub async fn ollama_generate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<Envelope>, Error> {
    let request: GenerateRequest = parse_request(&body)?;

    let ollama_request = OllamaGenerateRequest {
        model: state.config.ollama.default_model.clone(),
        prompt: request.input.query.unwrap_or_default(),
        stream: false,
        options: OllamaOptions {
            temperature: request.input.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        },
    };

    tracing::info!(
        request_id = %request_id.0,
        model = %ollama_request.model,
        prompt_chars = ollama_request.prompt.chars().count(),
        "Forwarding request to Ollama"
    );

    let response = state.ollama.generate(&ollama_request).await.map_err(|e| {
        tracing::error!(request_id = %request_id.0, error = %e, "Ollama generate failed");
        ollama_error(e, "Error communicating with Ollama")
    })?;

    Ok(Json(normalize_ollama_generate(&response)))
}

/// Handle POST /api/gemini-proxy
///
/// Plain chat against Gemini, answered in OpenAI `chat.completion` shape.
/// Unlike the other endpoints the key is checked before the body.
pub async fn gemini_proxy(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatCompletionResponse>, Error> {
    let api_key = gemini_key(&state, &headers)
        .ok_or_else(|| Error::MissingCredential("Gemini API token is required".to_string()))?;
    let request: GeminiChatRequest = parse_request(&body)?;

    if request.messages.is_empty() {
        return Err(Error::MissingParameter(
            "Parameter 'messages' is required".to_string(),
        ));
    }

    let model = request
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.gemini.default_model.clone());
    let generate = GenerateContentRequest::chat(
        request.messages.iter().map(|m| (m.role(), m.content())),
        GenerationConfig {
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_output_tokens: request.max_tokens.unwrap_or(DEFAULT_CHAT_MAX_TOKENS),
            top_p: None,
        },
    );

    tracing::info!(
        request_id = %request_id.0,
        model = %model,
        messages = request.messages.len(),
        key = %api_key.masked(),
        "Forwarding chat request to Gemini"
    );

    let response = state
        .gemini
        .generate_content(api_key.expose_secret(), &model, &generate)
        .await
        .map_err(|err| {
            tracing::error!(request_id = %request_id.0, error = %err, "Gemini chat failed");
            match err {
                ProviderError::Status { status, body } => Error::Upstream {
                    status,
                    message: format!("Gemini API returned {}", status.as_u16()),
                    details: Some(body),
                },
                other => Error::Provider(format!("Proxy server error: {}", other)),
            }
        })?;

    let now = chrono::Utc::now().timestamp_millis();
    Ok(Json(normalize_gemini_chat(
        &response,
        &model,
        &format!("gemini-{}", now),
        now,
    )))
}

/// Handle POST /api/sensay-proxy
///
/// Forwards a replica chat to Sensay and returns the reply unchanged.
pub async fn sensay_proxy(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, Error> {
    let api_key = header_value(&headers, SENSAY_KEY_HEADER)
        .map(ApiKey::from)
        .ok_or_else(|| Error::MissingParameter("Missing Sensay API key".to_string()))?;
    let user_id = header_value(&headers, SENSAY_USER_HEADER)
        .unwrap_or_else(|| state.config.sensay.default_user_id.clone());
    let request: SensayProxyRequest = parse_request(&body)?;

    let replica_id = request
        .replica_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::MissingParameter("Missing replica ID".to_string()))?;
    let messages = match request.messages {
        Some(Value::Array(messages)) => messages,
        _ => {
            return Err(Error::MissingParameter(
                "Invalid or missing messages".to_string(),
            ))
        }
    };

    let chat = SensayChatRequest {
        messages,
        source: request.source.unwrap_or_else(|| "web".to_string()),
        store: request.store.unwrap_or(true),
    };

    tracing::info!(
        request_id = %request_id.0,
        replica_id = %replica_id,
        user_id = %user_id,
        messages = chat.messages.len(),
        key = %api_key.masked(),
        "Forwarding chat request to Sensay"
    );

    let reply = state
        .sensay
        .chat_completion(api_key.expose_secret(), &user_id, &replica_id, &chat)
        .await
        .map_err(|err| {
            tracing::error!(request_id = %request_id.0, error = %err, "Sensay chat failed");
            sensay_error(err)
        })?;

    Ok(Json(reply))
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "llm-relay",
        "providers": {
            "replicate": state.replicate.url(),
            "gemini": state.gemini.base_url(),
            "gemini_server_key": state.config.gemini.key_source.to_string(),
            "ollama": state.ollama.base_url(),
            "sensay": state.sensay.base_url(),
        }
    }))
}
