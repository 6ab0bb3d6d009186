//! Scripted chat backend for tests.
//!
//! Probes, the router, and the combo evaluator all accept any
//! [`ChatBackend`]; tests script replies here instead of running live HTTP.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::message::{Message, ToolCall, ToolSpec};

use super::{CallOptions, ChatBackend, ChatResponse, ProviderError, ToolChoiceMode};

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum Reply {
    Message {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    Timeout,
    Transport(String),
}

impl Reply {
    pub fn content(text: impl Into<String>) -> Self {
        Reply::Message {
            content: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Reply::Message {
            content: String::new(),
            tool_calls: vec![ToolCall::new("call-1", name, arguments)],
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Reply::Message {
            content: String::new(),
            tool_calls: calls,
        }
    }
}

/// What one call looked like, for assertions.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    pub tool_choice: ToolChoiceMode,
}

type Handler = Box<dyn Fn(&RecordedCall) -> Reply + Send + Sync>;

/// Scripted [`ChatBackend`]: pops queued replies in order, or delegates to a
/// handler closure when one is installed. Every call is recorded.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    handler: Option<Handler>,
    calls: Mutex<Vec<RecordedCall>>,
    latency_ms: u64,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            handler: None,
            calls: Mutex::new(Vec::new()),
            latency_ms: 5,
        }
    }

    /// Replies computed per call (e.g. by model id) instead of a fixed queue.
    pub fn with_handler(handler: Handler) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            handler: Some(handler),
            calls: Mutex::new(Vec::new()),
            latency_ms: 5,
        }
    }

    /// Same fixed reply for every call.
    pub fn with_fixed(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::with_handler(Box::new(move |_| Reply::content(content.clone())))
    }

    pub fn set_latency_ms(&mut self, latency_ms: u64) {
        self.latency_ms = latency_ms;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    fn next_reply(&self, call: &RecordedCall) -> Reply {
        if let Some(handler) = &self.handler {
            return handler(call);
        }
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Reply::content("ok"))
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
        opts: &CallOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let call = RecordedCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            tool_names: tools
                .map(|ts| ts.iter().map(|t| t.name.clone()).collect())
                .unwrap_or_default(),
            tool_choice: opts.tool_choice,
        };
        let reply = self.next_reply(&call);
        self.calls.lock().expect("calls lock").push(call);

        match reply {
            Reply::Timeout => Err(ProviderError::Timeout {
                elapsed_ms: opts.timeout.as_millis() as u64,
            }),
            Reply::Transport(detail) => Err(ProviderError::Transport(detail)),
            Reply::Message {
                content,
                tool_calls,
            } => {
                let wire_calls: Vec<_> = tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": { "name": tc.name, "arguments": tc.arguments },
                        })
                    })
                    .collect();
                let mut message = json!({ "role": "assistant", "content": content });
                if !wire_calls.is_empty() {
                    message["tool_calls"] = json!(wire_calls);
                }
                let body = json!({
                    "id": "scripted",
                    "object": "chat.completion",
                    "model": model,
                    "choices": [{ "index": 0, "message": message, "finish_reason": "stop" }],
                });
                Ok(ChatResponse::new(body, self.latency_ms))
            }
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}
