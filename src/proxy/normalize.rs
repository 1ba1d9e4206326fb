//! Provider response → frontend shape.
//!
//! All functions here are pure. Envelope ids are generated by the caller so
//! that the same input always maps to the same output.

use serde_json::Value;

use super::types::{
    ChatCompletionResponse, ChatReply, Choice, Envelope, EnvelopeOutput, EnvelopeStatus,
    FunctionCallOutput, Message, Usage,
};
use crate::providers::gemini::GenerateContentResponse;
use crate::providers::ollama::{OllamaChatResponse, OllamaGenerateResponse};

/// Content used when Ollama answers without any text.
pub const OLLAMA_FALLBACK: &str = "No response from Ollama";
/// Fixed id of `/api/ollama` envelopes.
pub const OLLAMA_ENVELOPE_ID: &str = "ollama-response";
/// Placeholder output once function-calling retries are exhausted.
pub const PARTIAL_FAILURE_MESSAGE: &str =
    "I couldn't process your request properly. Please try rephrasing your question.";
/// Content used when a Gemini chat reply has no text.
pub const GEMINI_CHAT_FALLBACK: &str = "No response text";

/// Result of reading a Gemini function-calling response.
#[derive(Debug, Clone, PartialEq)]
pub enum GeminiOutcome {
    Envelope(Envelope),
    /// The prompt was refused by the safety filter.
    Blocked { reason: String, details: String },
    /// No function call, no text and no block reason.
    Empty,
}

/// Collect function calls and text from the first candidate.
///
/// Function calls win the `output` slot. `text_if_any` always carries the
/// model's text (or `null`). When several text parts are present the last one is kept.
pub fn normalize_gemini(response: &GenerateContentResponse, id: &str) -> GeminiOutcome {
    let mut calls = Vec::new();
    let mut text: Option<String> = None;

    for part in response.first_parts() {
        if let Some(call) = &part.function_call {
            calls.push(FunctionCallOutput {
                name: call.name.clone(),
                arguments: call
                    .args
                    .clone()
                    .filter(|args| !args.is_null())
                    .unwrap_or_else(|| Value::Object(Default::default())),
            });
        }
        if let Some(t) = part.text.as_deref().filter(|t| !t.is_empty()) {
            text = Some(t.to_string());
        }
    }

    let output = match (calls.is_empty(), &text) {
        (false, _) => EnvelopeOutput::FunctionCalls(calls),
        (true, Some(text)) => EnvelopeOutput::Text(text.clone()),
        (true, None) => {
            return match &response.prompt_feedback {
                Some(feedback) if feedback.block_reason.is_some() => GeminiOutcome::Blocked {
                    reason: feedback.block_reason.clone().unwrap_or_default(),
                    details: serde_json::to_string(feedback).unwrap_or_default(),
                },
                _ => GeminiOutcome::Empty,
            };
        }
    };

    GeminiOutcome::Envelope(Envelope {
        id: id.to_string(),
        status: EnvelopeStatus::Succeeded,
        output,
        text_if_any: Some(text),
    })
}

/// Soft failure returned after every function-calling attempt came back empty.
pub fn partial_failure(id: &str) -> Envelope {
    Envelope {
        id: id.to_string(),
        status: EnvelopeStatus::PartialFailure,
        output: EnvelopeOutput::Text(PARTIAL_FAILURE_MESSAGE.to_string()),
        text_if_any: None,
    }
}

/// `/api/chat`: the assistant message content, or the fallback text.
pub fn normalize_ollama_chat(response: &OllamaChatResponse) -> ChatReply {
    let content = response
        .message
        .as_ref()
        .and_then(|m| m.content.clone())
        .unwrap_or_else(|| OLLAMA_FALLBACK.to_string());

    ChatReply {
        message: Message {
            role: "assistant".to_string(),
            content,
        },
    }
}

/// `/api/ollama`: the generated text wrapped in a fixed-id envelope.
pub fn normalize_ollama_generate(response: &OllamaGenerateResponse) -> Envelope {
    Envelope {
        id: OLLAMA_ENVELOPE_ID.to_string(),
        status: EnvelopeStatus::Succeeded,
        output: EnvelopeOutput::Text(
            response
                .response
                .clone()
                .unwrap_or_else(|| OLLAMA_FALLBACK.to_string()),
        ),
        text_if_any: None,
    }
}

/// `/api/gemini-proxy`: first text part as an OpenAI-style completion.
pub fn normalize_gemini_chat(
    response: &GenerateContentResponse,
    model: &str,
    id: &str,
    created: i64,
) -> ChatCompletionResponse {
    let content = response
        .first_parts()
        .first()
        .and_then(|p| p.text.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| GEMINI_CHAT_FALLBACK.to_string());

    ChatCompletionResponse {
        id: id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage: Usage::UNKNOWN,
    }
}
