//! OpenAI-compatible chat-completions intercept.
//!
//! The handler parses the request, strips the IDE suffix off the model
//! string, maps IDE tool vocabulary to canonical, routes the turn (single or
//! dual), maps emitted tool calls back through the IDE table, and returns a
//! synthesized OpenAI-shaped body.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use tandem::cache::Cache;
use tandem::compress::{compress, estimate_tokens, CompressorConfig};
use tandem::ide::{parse_ide_suffix, IdeMapper, MappedCall};
use tandem::message::{Message, Role, ToolCall, ToolSpec};
use tandem::router::{RouteRequest, RouterError};

use crate::app::AppState;
use crate::response::ApiError;

/// How long a loaded IDE mapping document stays cached.
const IDE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Incoming chat-completions body. Tools arrive in the OpenAI function
/// envelope; `stream` is accepted but responses are always complete bodies
/// (the dual pipeline decodes fully before answering).
#[derive(Debug, Deserialize)]
pub struct ChatCompletionsBody {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub tools: Option<Vec<WireTool>>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub tool_calls: Option<Vec<Value>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: WireFunction,
}

#[derive(Debug, Deserialize)]
pub struct WireFunction {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

fn content_text(content: &Option<Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        // Multimodal arrays: concatenate the text parts.
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn parse_role(role: &str) -> Result<Role, ApiError> {
    match role.to_lowercase().as_str() {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(ApiError::bad_request(format!("unknown role: {other}"))),
    }
}

fn parse_messages(wire: &[WireMessage]) -> Result<Vec<Message>, ApiError> {
    wire.iter()
        .map(|m| {
            let mut message = Message {
                role: parse_role(&m.role)?,
                content: content_text(&m.content),
                tool_calls: Vec::new(),
                tool_call_id: m.tool_call_id.clone(),
                source: None,
            };
            if let Some(calls) = &m.tool_calls {
                message.tool_calls = calls
                    .iter()
                    .filter_map(|c| {
                        let name = c["function"]["name"].as_str()?;
                        Some(ToolCall::new(
                            c["id"].as_str().unwrap_or_default(),
                            name,
                            c["function"]["arguments"].as_str().unwrap_or("{}"),
                        ))
                    })
                    .collect();
            }
            Ok(message)
        })
        .collect()
}

fn parse_tools(wire: &Option<Vec<WireTool>>) -> Vec<ToolSpec> {
    wire.as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|t| t.tool_type == "function")
        .map(|t| {
            ToolSpec::new(
                &t.function.name,
                t.function.description.clone().unwrap_or_default(),
                t.function.parameters.clone().unwrap_or_else(|| json!({"type": "object"})),
            )
        })
        .collect()
}

/// Rewrites the response body's tool calls with their mapped forms.
fn apply_mapped_calls(body: &mut Value, mapped: &[MappedCall]) {
    let wire_calls: Vec<Value> = mapped
        .iter()
        .map(|m| {
            let call = m.call();
            json!({
                "id": call.id,
                "type": "function",
                "function": { "name": call.name, "arguments": call.arguments },
            })
        })
        .collect();
    if let Some(message) = body
        .get_mut("choices")
        .and_then(|c| c.get_mut(0))
        .and_then(|c| c.get_mut("message"))
    {
        if wire_calls.is_empty() {
            if let Some(obj) = message.as_object_mut() {
                obj.remove("tool_calls");
            }
        } else {
            message["tool_calls"] = Value::Array(wire_calls);
        }
    }
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatCompletionsBody>,
) -> Result<Json<Value>, ApiError> {
    if body.model.trim().is_empty() {
        return Err(ApiError::bad_request("missing model id"));
    }
    let (base_model, ide) = parse_ide_suffix(&body.model);
    let ide_key = ide.unwrap_or("default").to_string();
    let mapper = match state.ide_cache.get(&ide_key).await {
        Some(mapping) => IdeMapper::from_mapping(mapping),
        None => {
            let mapper = IdeMapper::load(state.core.data_root(), ide)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "ide mapping load failed; using builtin");
                    IdeMapper::builtin(ide)
                });
            let _ = state
                .ide_cache
                .set(ide_key, mapper.mapping().clone(), Some(IDE_CACHE_TTL))
                .await;
            mapper
        }
    };

    // Bind workspace-scoped state lazily: the failure log follows the
    // current workspace hash.
    if let Some(workspace) = state.workspace.current().await {
        if let Err(e) = state.core.failure_log.ensure_workspace(&workspace.hash).await {
            warn!(error = %e, "failure log rebind failed");
        }
    }

    let messages = parse_messages(&body.messages)?;
    let mut tools = parse_tools(&body.tools);

    // Long transcripts are compressed before routing: low-value runs fold
    // into summaries, tool calls and the recent tail survive verbatim.
    let config = state.core.router_config().await;
    let context_budget = match &config.executor_model {
        Some(model) => state
            .core
            .registry
            .get(model)
            .await
            .map(|p| p.settings.context_size)
            .unwrap_or(8192),
        None => 8192,
    };
    let total_tokens: u32 = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
    let messages = if total_tokens > context_budget {
        let compressed = compress(&messages, &CompressorConfig::default());
        debug!(
            original = compressed.stats.original_tokens,
            compressed = compressed.stats.compressed_tokens,
            dropped = compressed.stats.dropped,
            "transcript compressed before routing"
        );
        compressed.messages
    } else {
        messages
    };

    // Out-of-band extensions: canonical tools the executor knows that the
    // IDE's vocabulary does not cover.
    let mut executor_addendum = None;
    if let Some(executor_model) = &config.executor_model {
        if let Some(profile) = state.core.registry.get(executor_model).await {
            let (extensions, addendum) = mapper.extensions(&profile.enabled_tools, &tools);
            tools.extend(extensions);
            executor_addendum = addendum;
        }
    }

    let deadline = Instant::now() + turn_deadline(config.timeout);
    let mut request = RouteRequest::new(base_model, messages);
    request.tools = tools;
    request.deadline = Some(deadline);
    request.executor_addendum = executor_addendum;

    if body.stream.unwrap_or(false) {
        // The dual pipeline decodes fully before answering; streaming
        // requests get a complete body.
        debug!("stream requested; responding unstreamed");
    }
    if let Some(choice) = &body.tool_choice {
        debug!(tool_choice = %choice, "client tool_choice noted; executor stage runs auto");
    }

    // Request temperature overrides the configured default for this turn.
    let mut router = state.core.router().await;
    if body.temperature.is_some() {
        let mut turn_config = config.clone();
        turn_config.temperature = body.temperature;
        router = tandem::router::IntentRouter::new(
            state.core.backend.clone(),
            state.core.registry.clone(),
            state.core.prosthetics.clone(),
            state.core.failure_log.clone(),
            turn_config,
        );
    }
    let result = router.route(request).await.map_err(|e| match e {
        RouterError::Configuration(msg) => ApiError::bad_request(msg),
    })?;

    // Translate emitted calls through the IDE table before answering.
    let mapped: Vec<MappedCall> = result
        .tool_calls
        .iter()
        .map(|c| mapper.map_tool_call(c))
        .collect();
    for m in &mapped {
        if let MappedCall::Unknown(call) = m {
            debug!(tool = %call.name, "unknown tool call passed through unmapped");
        }
    }

    let mut response_body = result.final_response.body.clone();
    apply_mapped_calls(&mut response_body, &mapped);
    response_body["model"] = json!(body.model);

    let (frame_type, session_id) = {
        let mut sessions = state.sessions.lock().await;
        match sessions.get(&body.model) {
            Some(id) => ("session_updated", id.clone()),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                sessions.insert(body.model.clone(), id.clone());
                ("session_created", id)
            }
        }
    };
    state.hub.send(
        frame_type,
        json!({
            "sessionId": session_id,
            "model": body.model,
            "mode": result.mode,
            "toolCalls": mapped.len(),
            "latency": result.latency,
        }),
    );
    Ok(Json(response_body))
}

/// Per-turn deadline: planning plus execution plus slack.
fn turn_deadline(call_timeout: Duration) -> Duration {
    call_timeout * 2 + Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_parse_roles_and_multimodal_content() {
        let wire = vec![
            WireMessage {
                role: "system".to_string(),
                content: Some(json!("be terse")),
                tool_calls: None,
                tool_call_id: None,
            },
            WireMessage {
                role: "user".to_string(),
                content: Some(json!([{"type": "text", "text": "read "}, {"type": "text", "text": "a.rs"}])),
                tool_calls: None,
                tool_call_id: None,
            },
        ];
        let messages = parse_messages(&wire).unwrap();
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "read a.rs");
    }

    #[test]
    fn unknown_role_is_rejected() {
        let wire = vec![WireMessage {
            role: "narrator".to_string(),
            content: None,
            tool_calls: None,
            tool_call_id: None,
        }];
        assert!(parse_messages(&wire).is_err());
    }

    #[test]
    fn tools_parse_from_function_envelope() {
        let tools = parse_tools(&Some(vec![WireTool {
            tool_type: "function".to_string(),
            function: WireFunction {
                name: "read_file".to_string(),
                description: Some("Reads a file.".to_string()),
                parameters: Some(json!({"type": "object"})),
            },
        }]));
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "read_file");
    }

    #[test]
    fn mapped_calls_rewrite_the_response() {
        let mut body = json!({
            "choices": [{ "message": { "role": "assistant", "content": null,
                "tool_calls": [{"id": "x", "type": "function",
                    "function": {"name": "old", "arguments": "{}"}}] } }]
        });
        let mapped = vec![MappedCall::Transformed(ToolCall::new(
            "x",
            "read_file",
            r#"{"path":"a.rs"}"#,
        ))];
        apply_mapped_calls(&mut body, &mapped);
        assert_eq!(
            body["choices"][0]["message"]["tool_calls"][0]["function"]["name"],
            "read_file"
        );
    }
}
