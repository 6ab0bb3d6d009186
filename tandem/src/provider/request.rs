//! Wire encoding of chat-completion requests.
//!
//! Field names match the OpenAI Chat Completions API; tools are sent in the
//! `function` envelope, tool calls in assistant messages carry stringified
//! arguments.

use serde_json::{json, Value};

use crate::message::{Message, Role, ToolSpec};

use super::{CallOptions, ToolChoiceMode};

/// Builds the request body for one chat call.
pub(super) fn chat_payload(
    model: &str,
    messages: &[Message],
    tools: Option<&[ToolSpec]>,
    opts: &CallOptions,
    stop: Option<Vec<String>>,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
        "stream": false,
    });

    if let Some(tools) = tools {
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(wire_tool).collect());
            if opts.tool_choice != ToolChoiceMode::Auto {
                body["tool_choice"] = json!(opts.tool_choice.as_wire());
            }
        }
    }
    if let Some(t) = opts.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(m) = opts.max_tokens {
        body["max_tokens"] = json!(m);
    }
    if let Some(stop) = stop {
        body["stop"] = json!(stop);
    }
    body
}

fn wire_message(msg: &Message) -> Value {
    let mut out = json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    });
    if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
        out["tool_calls"] = Value::Array(
            msg.tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": { "name": tc.name, "arguments": tc.arguments },
                    })
                })
                .collect(),
        );
    }
    if let Some(id) = &msg.tool_call_id {
        out["tool_call_id"] = json!(id);
    }
    out
}

fn wire_tool(tool: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}
