//! Thin envelope over the upstream chat-completion body.
//!
//! The raw body stays untyped; explicit accessors surface missing or
//! malformed fields as [`ProviderError::Protocol`] instead of panicking.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::message::ToolCall;

use super::ProviderError;

/// Token usage reported by the upstream provider.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Typed view of `choices[0].message`.
#[derive(Clone, Debug, Default)]
pub struct ResponseMessage {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// One chat response: untyped body plus measured wall-clock latency
/// (dispatch to full decode).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub body: Value,
    pub latency_ms: u64,
}

impl ChatResponse {
    pub fn new(body: Value, latency_ms: u64) -> Self {
        Self { body, latency_ms }
    }

    /// Builds a response the router synthesizes itself (early returns,
    /// flagged error phases). Shape matches an upstream body so callers
    /// never need to distinguish.
    pub fn synthesized(model: &str, content: &str) -> Self {
        let body = json!({
            "id": format!("tandem-{}", uuid::Uuid::new_v4()),
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop",
            }],
        });
        Self::new(body, 0)
    }

    /// `choices[0].message`, or a protocol error when the envelope is malformed.
    pub fn message(&self) -> Result<ResponseMessage, ProviderError> {
        let message = self.body["choices"]
            .get(0)
            .map(|c| &c["message"])
            .filter(|m| m.is_object())
            .ok_or_else(|| ProviderError::Protocol {
                status: None,
                detail: "response has no choices[0].message".to_string(),
            })?;
        Ok(ResponseMessage {
            content: message["content"].as_str().unwrap_or_default().to_string(),
            tool_calls: parse_tool_calls(&message["tool_calls"]),
        })
    }

    /// Assistant text; empty when the model produced none. Lenient: a model
    /// producing nothing is a behavior signal, not a transport failure.
    pub fn content(&self) -> String {
        self.message().map(|m| m.content).unwrap_or_default()
    }

    /// Tool calls; empty when none were emitted.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.message().map(|m| m.tool_calls).unwrap_or_default()
    }

    pub fn usage(&self) -> Option<Usage> {
        serde_json::from_value(self.body["usage"].clone()).ok()
    }

    /// Finish reason of the first choice, when reported.
    pub fn finish_reason(&self) -> Option<String> {
        self.body["choices"][0]["finish_reason"]
            .as_str()
            .map(String::from)
    }
}

fn parse_tool_calls(value: &Value) -> Vec<ToolCall> {
    let Some(calls) = value.as_array() else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|c| {
            let function = &c["function"];
            let name = function["name"].as_str()?;
            let arguments = match &function["arguments"] {
                Value::String(s) => s.clone(),
                // Some local hosts inline the object instead of stringifying it.
                v @ Value::Object(_) => v.to_string(),
                _ => String::new(),
            };
            Some(ToolCall {
                id: c["id"].as_str().unwrap_or_default().to_string(),
                name: name.to_string(),
                arguments,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream_body(message: Value) -> Value {
        json!({ "choices": [{ "index": 0, "message": message }] })
    }

    #[test]
    fn content_accessor_reads_choices() {
        let resp = ChatResponse::new(
            upstream_body(json!({"role": "assistant", "content": "hi"})),
            12,
        );
        assert_eq!(resp.content(), "hi");
        assert!(resp.tool_calls().is_empty());
        assert_eq!(resp.latency_ms, 12);
    }

    #[test]
    fn missing_choices_is_a_protocol_error() {
        let resp = ChatResponse::new(json!({"error": "nope"}), 0);
        assert!(matches!(
            resp.message(),
            Err(ProviderError::Protocol { .. })
        ));
        assert_eq!(resp.content(), "");
    }

    #[test]
    fn tool_calls_parse_both_argument_encodings() {
        let resp = ChatResponse::new(
            upstream_body(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "a", "type": "function", "function": {"name": "ping", "arguments": "{\"value\":\"x\"}"}},
                    {"id": "b", "type": "function", "function": {"name": "ping", "arguments": {"value": "y"}}},
                ],
            })),
            0,
        );
        let calls = resp.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].parsed_arguments().unwrap()["value"], "x");
        assert_eq!(calls[1].parsed_arguments().unwrap()["value"], "y");
    }

    #[test]
    fn synthesized_response_passes_envelope_check() {
        let resp = ChatResponse::synthesized("m", "done");
        assert_eq!(resp.message().unwrap().content, "done");
        assert_eq!(resp.body["model"], "m");
    }
}
