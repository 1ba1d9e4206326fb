//! Frontend-facing request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default sampling temperature for every endpoint.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Default output token budget for function calling.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
/// Default output token budget for Gemini chat.
pub const DEFAULT_CHAT_MAX_TOKENS: u32 = 2000;

/// Body of `POST /api/gemini_functions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionCallRequest {
    pub query: Option<String>,
    /// OpenAI-style tool list, usually JSON-encoded as a string.
    pub tools: Option<Value>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_output_tokens: Option<u32>,
    /// Older name for `max_output_tokens`.
    pub max_new_tokens: Option<u32>,
}

impl FunctionCallRequest {
    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
            .or(self.max_new_tokens)
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS)
    }
}

/// A chat message as sent by the frontend; both fields may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

impl InboundMessage {
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or("user")
    }

    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

/// Body of `POST /api/ollama`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub input: GenerateInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateInput {
    pub query: Option<String>,
    pub temperature: Option<f64>,
}

/// Body of `POST /api/gemini-proxy`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiChatRequest {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Body of `POST /api/sensay-proxy`.
///
/// `messages` stays untyped so a non-array value can be reported as such.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensayProxyRequest {
    pub replica_id: Option<String>,
    pub messages: Option<Value>,
    pub source: Option<String>,
    pub store: Option<bool>,
}

/// The normalized response returned to the frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub status: EnvelopeStatus,
    pub output: EnvelopeOutput,
    /// Model text on succeeded function-calling envelopes, written as `null`
    /// when there was none. The outer `None` leaves the key out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_if_any: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Succeeded,
    PartialFailure,
    Error,
}

/// Either plain text or the function calls the model asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeOutput {
    Text(String),
    FunctionCalls(Vec<FunctionCallOutput>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutput {
    pub name: String,
    pub arguments: Value,
}

/// `/api/chat` reply: `{"message": {"role": "assistant", "content": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub message: Message,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Chat completion response (OpenAI-compatible), returned by `/api/gemini-proxy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// Token usage. Gemini counts are not read back, so every field is `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

impl Usage {
    pub const UNKNOWN: Usage = Usage {
        prompt_tokens: -1,
        completion_tokens: -1,
        total_tokens: -1,
    };
}

/// A completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_max_output_tokens_falls_back_to_max_new_tokens() {
        let request: FunctionCallRequest =
            serde_json::from_value(json!({"max_new_tokens": 512})).unwrap();
        assert_eq!(request.max_output_tokens(), 512);

        let request: FunctionCallRequest =
            serde_json::from_value(json!({"max_output_tokens": 100, "max_new_tokens": 512}))
                .unwrap();
        assert_eq!(request.max_output_tokens(), 100);

        assert_eq!(
            FunctionCallRequest::default().max_output_tokens(),
            DEFAULT_MAX_OUTPUT_TOKENS
        );
    }

    #[test]
    fn test_inbound_message_defaults() {
        let message: InboundMessage = serde_json::from_value(json!({"content": null})).unwrap();
        assert_eq!(message.role(), "user");
        assert_eq!(message.content(), "");
    }

    #[test]
    fn test_envelope_with_function_calls_serializes() {
        let envelope = Envelope {
            id: "gemini-func-1".to_string(),
            status: EnvelopeStatus::Succeeded,
            output: EnvelopeOutput::FunctionCalls(vec![FunctionCallOutput {
                name: "balance".to_string(),
                arguments: json!({"address": "0x1"}),
            }]),
            text_if_any: Some(Some("checking".to_string())),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "id": "gemini-func-1",
                "status": "succeeded",
                "output": [{"name": "balance", "arguments": {"address": "0x1"}}],
                "text_if_any": "checking"
            })
        );
    }

    #[test]
    fn test_envelope_writes_null_text_if_any() {
        let envelope = Envelope {
            id: "gemini-func-1".to_string(),
            status: EnvelopeStatus::Succeeded,
            output: EnvelopeOutput::FunctionCalls(vec![]),
            text_if_any: Some(None),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value.as_object().unwrap().contains_key("text_if_any"));
        assert!(value["text_if_any"].is_null());
    }

    #[test]
    fn test_envelope_without_text_slot_omits_text_if_any() {
        let envelope = Envelope {
            id: "ollama-response".to_string(),
            status: EnvelopeStatus::PartialFailure,
            output: EnvelopeOutput::Text("hi".to_string()),
            text_if_any: None,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""status":"partial_failure""#));
        assert!(!json.contains("text_if_any"), "unexpected field: {}", json);
    }
}
