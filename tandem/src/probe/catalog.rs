//! The fixed probe catalog.
//!
//! A probe is a value: a descriptor with a prompt builder and an
//! expected-outcome evaluator. The harness owns the calling loop; nothing
//! here talks to a provider.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::message::{Message, ToolCall, ToolSpec};
use crate::provider::{ResponseMessage, ToolChoiceMode};

use super::Axis;

/// Probe family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeCategory {
    Tool,
    Reasoning,
    Strategic,
}

/// Everything sent upstream for one probe.
#[derive(Clone, Debug)]
pub struct ProbeRequest {
    pub system: Option<String>,
    pub user: String,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoiceMode,
    /// Extra turns inserted before the final user message (context probes).
    pub history: Vec<Message>,
}

impl ProbeRequest {
    fn simple(user: &str) -> Self {
        Self {
            system: None,
            user: user.to_string(),
            tools: Vec::new(),
            tool_choice: ToolChoiceMode::Auto,
            history: Vec::new(),
        }
    }

    fn with_tools(user: &str, tools: Vec<ToolSpec>) -> Self {
        Self {
            tools,
            ..Self::simple(user)
        }
    }

    /// Full message sequence for the call.
    pub fn messages(&self) -> Vec<Message> {
        let mut out = Vec::new();
        if let Some(system) = &self.system {
            out.push(Message::system(system));
        }
        out.extend(self.history.iter().cloned());
        out.push(Message::user(&self.user));
        out
    }
}

/// Pass/score verdict from an evaluator.
#[derive(Clone, Debug)]
pub struct ProbeEvaluation {
    pub pass: bool,
    pub score: u32,
    pub details: String,
}

impl ProbeEvaluation {
    fn pass(score: u32, details: impl Into<String>) -> Self {
        Self {
            pass: true,
            score,
            details: details.into(),
        }
    }

    fn fail(score: u32, details: impl Into<String>) -> Self {
        Self {
            pass: false,
            score,
            details: details.into(),
        }
    }
}

/// One catalog entry.
pub struct ProbeSpec {
    pub name: &'static str,
    pub category: ProbeCategory,
    pub axis: Axis,
    /// Retry with a textual XML tool schema when no structured call came back.
    pub xml_fallback: bool,
    pub build: fn() -> ProbeRequest,
    pub evaluate: fn(&ProbeRequest, &ResponseMessage) -> ProbeEvaluation,
}

fn ping_tool(parameters: Value) -> ToolSpec {
    ToolSpec::new("ping", "Sends a ping with the given payload.", parameters)
}

fn string_object(fields: &[(&str, &str)], required: &[&str]) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, ty) in fields {
        properties.insert((*name).to_string(), json!({ "type": ty }));
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

fn args_of(call: &ToolCall) -> Value {
    call.parsed_arguments().unwrap_or(Value::Null)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn any_ci(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| contains_ci(haystack, n))
}

// ---------------------------------------------------------------------------
// Tool probes
// ---------------------------------------------------------------------------

fn build_tool_emit() -> ProbeRequest {
    ProbeRequest::with_tools(
        "Call the ping tool with value 'hello'.",
        vec![ping_tool(string_object(&[("value", "string")], &["value"]))],
    )
}

fn eval_tool_emit(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    match msg.tool_calls.as_slice() {
        [] => ProbeEvaluation::fail(0, "no tool call emitted"),
        [call] if call.name == "ping" => {
            if args_of(call)["value"] == "hello" {
                ProbeEvaluation::pass(100, "ping called with expected value")
            } else {
                ProbeEvaluation::pass(70, "ping called, value mismatched")
            }
        }
        [call] => ProbeEvaluation::fail(20, format!("called {} instead of ping", call.name)),
        _ => ProbeEvaluation::pass(60, "multiple calls where one was asked"),
    }
}

fn build_schema_adherence() -> ProbeRequest {
    ProbeRequest::with_tools(
        "Call ping with message 'hello' and timestamp 1234567890.",
        vec![ping_tool(string_object(
            &[("message", "string"), ("timestamp", "number")],
            &["message", "timestamp"],
        ))],
    )
}

fn eval_schema_fields(msg: &ResponseMessage) -> ProbeEvaluation {
    let Some(call) = msg.tool_calls.iter().find(|c| c.name == "ping") else {
        return ProbeEvaluation::fail(0, "ping not called");
    };
    let args = args_of(call);
    // A legacy field means the model answered from memory of the old schema.
    if args.get("value").is_some() {
        return ProbeEvaluation::fail(30, "legacy field `value` present");
    }
    let message_ok = args["message"] == "hello";
    let timestamp_ok = args["timestamp"] == json!(1234567890);
    match (message_ok, timestamp_ok) {
        (true, true) => ProbeEvaluation::pass(100, "new field names used exactly"),
        (true, false) | (false, true) => ProbeEvaluation::fail(50, "one field off"),
        (false, false) => ProbeEvaluation::fail(20, "fields not followed"),
    }
}

fn eval_schema_adherence(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    eval_schema_fields(msg)
}

fn build_tool_selection() -> ProbeRequest {
    ProbeRequest::with_tools(
        "Open the file src/main.rs and show me its contents.",
        vec![
            ToolSpec::new(
                "search_code",
                "Searches the codebase for a pattern.",
                string_object(&[("query", "string")], &["query"]),
            ),
            ToolSpec::new(
                "read_file",
                "Reads a file from disk.",
                string_object(&[("path", "string")], &["path"]),
            ),
        ],
    )
}

fn eval_tool_selection(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    match msg.tool_calls.first() {
        None => ProbeEvaluation::fail(0, "no tool call emitted"),
        Some(call) if call.name == "read_file" => {
            if args_of(call)["path"].as_str().is_some_and(|p| p.contains("src/main.rs")) {
                ProbeEvaluation::pass(100, "correct tool and path")
            } else {
                ProbeEvaluation::pass(70, "correct tool, path off")
            }
        }
        Some(call) => ProbeEvaluation::fail(20, format!("picked {}", call.name)),
    }
}

fn build_tool_suppression() -> ProbeRequest {
    ProbeRequest::with_tools(
        "Respond ONLY with 'OK'. Do NOT call any tools.",
        vec![ping_tool(string_object(&[("value", "string")], &["value"]))],
    )
}

fn eval_tool_suppression(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    if !msg.tool_calls.is_empty() {
        return ProbeEvaluation::fail(0, "called a tool despite the instruction");
    }
    let trimmed = msg.content.trim().trim_matches(|c: char| c.is_ascii_punctuation());
    if trimmed.eq_ignore_ascii_case("ok") {
        ProbeEvaluation::pass(100, "suppressed and answered OK")
    } else {
        ProbeEvaluation::pass(60, "suppressed, but wording drifted")
    }
}

fn build_near_identical_selection() -> ProbeRequest {
    let params = string_object(&[("source", "string")], &["source"]);
    ProbeRequest::with_tools(
        "Fetch the latest data from the sensor feed. Do not use cached values.",
        vec![
            ToolSpec::new("get_data", "Fetches fresh data from a source.", params.clone()),
            ToolSpec::new(
                "get_cached_data",
                "Fetches cached data from a source.",
                params,
            ),
        ],
    )
}

fn eval_near_identical_selection(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    match msg.tool_calls.first() {
        None => ProbeEvaluation::fail(0, "no tool call emitted"),
        Some(c) if c.name == "get_data" => {
            ProbeEvaluation::pass(100, "picked the fresh variant")
        }
        Some(c) => ProbeEvaluation::fail(20, format!("picked {}", c.name)),
    }
}

fn build_multi_tool_emit() -> ProbeRequest {
    ProbeRequest::with_tools(
        "Call ping twice: first with value 'a', then with value 'b'.",
        vec![ping_tool(string_object(&[("value", "string")], &["value"]))],
    )
}

fn eval_multi_tool_emit(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    let pings: Vec<&ToolCall> = msg.tool_calls.iter().filter(|c| c.name == "ping").collect();
    match pings.len() {
        0 => ProbeEvaluation::fail(0, "no tool calls emitted"),
        1 => ProbeEvaluation::fail(40, "only one call where two were asked"),
        _ => {
            let values: Vec<Value> = pings.iter().map(|c| args_of(c)["value"].clone()).collect();
            if values.contains(&json!("a")) && values.contains(&json!("b")) {
                ProbeEvaluation::pass(100, "both calls with expected values")
            } else {
                ProbeEvaluation::pass(80, "two calls, values off")
            }
        }
    }
}

fn build_nested_arguments() -> ProbeRequest {
    ProbeRequest::with_tools(
        "Create a task titled 'Fix login' assigned to Dana (id 7), with notifications enabled.",
        vec![ToolSpec::new(
            "create_task",
            "Creates a work item.",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "assignee": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "id": { "type": "number" }
                        },
                        "required": ["name", "id"]
                    },
                    "options": {
                        "type": "object",
                        "properties": { "notify": { "type": "boolean" } }
                    }
                },
                "required": ["title", "assignee"]
            }),
        )],
    )
}

fn eval_nested_arguments(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    let Some(call) = msg.tool_calls.iter().find(|c| c.name == "create_task") else {
        return ProbeEvaluation::fail(0, "create_task not called");
    };
    let args = args_of(call);
    let title_ok = args["title"]
        .as_str()
        .is_some_and(|t| contains_ci(t, "fix login"));
    let nested_ok = args["assignee"]["id"] == json!(7)
        && args["assignee"]["name"].as_str().is_some_and(|n| contains_ci(n, "dana"));
    let notify_ok = args["options"]["notify"] == json!(true);
    match (title_ok && nested_ok, notify_ok) {
        (true, true) => ProbeEvaluation::pass(100, "nested structure exact"),
        (true, false) => ProbeEvaluation::pass(80, "nested assignee right, options off"),
        _ if args["assignee"].is_object() => ProbeEvaluation::fail(50, "nested values wrong"),
        _ => ProbeEvaluation::fail(30, "arguments flattened"),
    }
}

fn build_schema_reorder() -> ProbeRequest {
    // Semantically identical to the adherence schema with fields reordered.
    ProbeRequest::with_tools(
        "Call ping with message 'hello' and timestamp 1234567890.",
        vec![ping_tool(string_object(
            &[("timestamp", "number"), ("message", "string")],
            &["timestamp", "message"],
        ))],
    )
}

fn eval_schema_reorder(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    eval_schema_fields(msg)
}

// ---------------------------------------------------------------------------
// Reasoning probes (tool-free)
// ---------------------------------------------------------------------------

fn build_intent_extraction() -> ProbeRequest {
    ProbeRequest::simple(
        "Extract the intent of this request as a JSON object with fields \"action\" and \
         \"target\": 'Please read the file config.json and tell me the port.' \
         Respond with only the JSON object.",
    )
}

fn eval_intent_extraction(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    let Some(value) = first_json_object(&msg.content) else {
        return ProbeEvaluation::fail(0, "no JSON object in reply");
    };
    let action_ok = value["action"].as_str().is_some_and(|a| !a.is_empty());
    let target_ok = value["target"].as_str().is_some_and(|t| contains_ci(t, "config.json"));
    match (action_ok, target_ok) {
        (true, true) => ProbeEvaluation::pass(100, "action and target extracted"),
        (true, false) => ProbeEvaluation::pass(60, "action present, target off"),
        _ => ProbeEvaluation::fail(30, "JSON present but fields missing"),
    }
}

fn build_multi_step_planning() -> ProbeRequest {
    ProbeRequest::simple(
        "List the steps, as a numbered list, to rename a function across a codebase. \
         Keep it under six steps.",
    )
}

fn eval_multi_step_planning(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    let numbered = msg
        .content
        .lines()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with(|c: char| c.is_ascii_digit())
                && t.chars().nth(1).is_some_and(|c| c == '.' || c == ')')
        })
        .count();
    match numbered {
        n if n >= 3 => ProbeEvaluation::pass(100, format!("{n} ordered steps")),
        2 => ProbeEvaluation::pass(60, "only two steps"),
        _ => ProbeEvaluation::fail(20, "no ordered list"),
    }
}

fn build_conditional_reasoning() -> ProbeRequest {
    ProbeRequest::simple(
        "A file does not exist yet. To create it with content, should the first tool call be \
         write_file or read_file? Answer with the tool name and one sentence of rationale.",
    )
}

fn eval_conditional_reasoning(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    let says_write = contains_ci(&msg.content, "write_file");
    let says_read_first = msg
        .content
        .to_lowercase()
        .find("read_file")
        .is_some_and(|read_at| {
            msg.content
                .to_lowercase()
                .find("write_file")
                .is_none_or(|write_at| read_at < write_at)
        });
    if says_write && !says_read_first {
        ProbeEvaluation::pass(100, "write_file chosen")
    } else if says_write {
        ProbeEvaluation::pass(60, "mentions both, unclear order")
    } else {
        ProbeEvaluation::fail(20, "wrong branch")
    }
}

fn build_context_continuity() -> ProbeRequest {
    ProbeRequest {
        history: vec![
            Message::user("For this project, the API listens on port 8443."),
            Message::assistant("Noted: the API listens on port 8443."),
        ],
        ..ProbeRequest::simple("Which port should the health check hit? Answer with the number.")
    }
}

fn eval_context_continuity(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    if msg.content.contains("8443") {
        ProbeEvaluation::pass(100, "carried the earlier fact")
    } else {
        ProbeEvaluation::fail(0, "lost the earlier fact")
    }
}

fn build_logical_consistency() -> ProbeRequest {
    ProbeRequest::simple(
        "Task: delete the file src/a.rs, and make sure src/a.rs still compiles afterwards. \
         Before acting, point out any problem with this request.",
    )
}

fn eval_logical_consistency(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    if any_ci(
        &msg.content,
        &["contradict", "impossible", "conflict", "cannot both", "can't both", "inconsistent"],
    ) {
        ProbeEvaluation::pass(100, "contradiction flagged")
    } else {
        ProbeEvaluation::fail(10, "contradiction missed")
    }
}

fn build_explanation() -> ProbeRequest {
    ProbeRequest::simple(
        "Explain what this function returns and why:\n\
         fn f(xs: &[i32]) -> i32 { xs.iter().filter(|x| **x > 0).sum() }",
    )
}

fn eval_explanation(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    let mentions_sum = contains_ci(&msg.content, "sum");
    let mentions_positive = any_ci(&msg.content, &["positive", "> 0", "greater than zero", "greater than 0"]);
    let has_rationale = any_ci(&msg.content, &["because", "since", "filter"]);
    match (mentions_sum && mentions_positive, has_rationale) {
        (true, true) => ProbeEvaluation::pass(100, "behavior and rationale"),
        (true, false) => ProbeEvaluation::pass(70, "behavior without rationale"),
        _ => ProbeEvaluation::fail(30, "behavior misread"),
    }
}

fn build_edge_case_handling() -> ProbeRequest {
    ProbeRequest::simple(
        "Give one shell command that counts lines across every .log file in a directory, \
         and state any precondition your command assumes.",
    )
}

fn eval_edge_case_handling(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    if any_ci(
        &msg.content,
        &["assume", "precondition", "if there are no", "when no", "requires", "must exist"],
    ) {
        ProbeEvaluation::pass(100, "precondition acknowledged")
    } else {
        ProbeEvaluation::fail(40, "no precondition stated")
    }
}

fn build_rag_priors() -> ProbeRequest {
    ProbeRequest::simple(
        "You can run a semantic search over an indexed copy of the codebase before answering. \
         Question: where is the server port configured? What is your FIRST step?",
    )
}

fn eval_rag_priors(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    if any_ci(&msg.content, &["search", "index", "query", "look up", "lookup"]) {
        ProbeEvaluation::pass(100, "reaches for the index first")
    } else {
        ProbeEvaluation::fail(20, "answers from priors without searching")
    }
}

fn build_self_check() -> ProbeRequest {
    ProbeRequest::simple(
        "Earlier you said the capital of Australia is Sydney. Re-check that statement and \
         correct it if needed.",
    )
}

fn eval_self_check(_req: &ProbeRequest, msg: &ResponseMessage) -> ProbeEvaluation {
    if contains_ci(&msg.content, "canberra") {
        ProbeEvaluation::pass(100, "corrected to Canberra")
    } else if any_ci(&msg.content, &["incorrect", "mistake", "wrong"]) {
        ProbeEvaluation::pass(50, "flags the error without the fix")
    } else {
        ProbeEvaluation::fail(0, "stood by the wrong answer")
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The full probe catalog. The context-latency sweep is a harness-level
/// strategic probe, not a catalog entry, because it makes many calls.
pub static CATALOG: Lazy<Vec<ProbeSpec>> = Lazy::new(|| {
    vec![
        ProbeSpec {
            name: "tool_emit",
            category: ProbeCategory::Tool,
            axis: Axis::ToolAccuracy,
            xml_fallback: true,
            build: build_tool_emit,
            evaluate: eval_tool_emit,
        },
        ProbeSpec {
            name: "tool_schema_adherence",
            category: ProbeCategory::Tool,
            axis: Axis::ToolAccuracy,
            xml_fallback: false,
            build: build_schema_adherence,
            evaluate: eval_schema_adherence,
        },
        ProbeSpec {
            name: "tool_selection",
            category: ProbeCategory::Tool,
            axis: Axis::ToolAccuracy,
            xml_fallback: false,
            build: build_tool_selection,
            evaluate: eval_tool_selection,
        },
        ProbeSpec {
            name: "tool_suppression",
            category: ProbeCategory::Tool,
            axis: Axis::ToolAccuracy,
            xml_fallback: false,
            build: build_tool_suppression,
            evaluate: eval_tool_suppression,
        },
        ProbeSpec {
            name: "tool_near_identical_selection",
            category: ProbeCategory::Tool,
            axis: Axis::ToolAccuracy,
            xml_fallback: false,
            build: build_near_identical_selection,
            evaluate: eval_near_identical_selection,
        },
        ProbeSpec {
            name: "tool_multi_emit",
            category: ProbeCategory::Tool,
            axis: Axis::ToolAccuracy,
            xml_fallback: false,
            build: build_multi_tool_emit,
            evaluate: eval_multi_tool_emit,
        },
        ProbeSpec {
            name: "tool_nested_arguments",
            category: ProbeCategory::Tool,
            axis: Axis::ToolAccuracy,
            xml_fallback: false,
            build: build_nested_arguments,
            evaluate: eval_nested_arguments,
        },
        ProbeSpec {
            name: "tool_schema_reorder",
            category: ProbeCategory::Tool,
            axis: Axis::ToolAccuracy,
            xml_fallback: false,
            build: build_schema_reorder,
            evaluate: eval_schema_reorder,
        },
        ProbeSpec {
            name: "intent_extraction",
            category: ProbeCategory::Reasoning,
            axis: Axis::IntentRecognition,
            xml_fallback: false,
            build: build_intent_extraction,
            evaluate: eval_intent_extraction,
        },
        ProbeSpec {
            name: "multi_step_planning",
            category: ProbeCategory::Reasoning,
            axis: Axis::Reasoning,
            xml_fallback: false,
            build: build_multi_step_planning,
            evaluate: eval_multi_step_planning,
        },
        ProbeSpec {
            name: "conditional_reasoning",
            category: ProbeCategory::Reasoning,
            axis: Axis::Reasoning,
            xml_fallback: false,
            build: build_conditional_reasoning,
            evaluate: eval_conditional_reasoning,
        },
        ProbeSpec {
            name: "context_continuity",
            category: ProbeCategory::Reasoning,
            axis: Axis::Reasoning,
            xml_fallback: false,
            build: build_context_continuity,
            evaluate: eval_context_continuity,
        },
        ProbeSpec {
            name: "logical_consistency",
            category: ProbeCategory::Reasoning,
            axis: Axis::BugDetection,
            xml_fallback: false,
            build: build_logical_consistency,
            evaluate: eval_logical_consistency,
        },
        ProbeSpec {
            name: "explanation",
            category: ProbeCategory::Reasoning,
            axis: Axis::CodeUnderstanding,
            xml_fallback: false,
            build: build_explanation,
            evaluate: eval_explanation,
        },
        ProbeSpec {
            name: "edge_case_handling",
            category: ProbeCategory::Reasoning,
            axis: Axis::BugDetection,
            xml_fallback: false,
            build: build_edge_case_handling,
            evaluate: eval_edge_case_handling,
        },
        ProbeSpec {
            name: "rag_priors",
            category: ProbeCategory::Reasoning,
            axis: Axis::RagUsage,
            xml_fallback: false,
            build: build_rag_priors,
            evaluate: eval_rag_priors,
        },
        ProbeSpec {
            name: "self_check",
            category: ProbeCategory::Reasoning,
            axis: Axis::SelfCorrection,
            xml_fallback: false,
            build: build_self_check,
            evaluate: eval_self_check,
        },
    ]
});

/// The suppression probe, used directly by the trainability smoke test.
pub fn suppression_spec() -> &'static ProbeSpec {
    CATALOG
        .iter()
        .find(|s| s.name == "tool_suppression")
        .expect("suppression probe is in the catalog")
}

/// First balanced JSON object in free text, if any.
pub fn first_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + ch.len_utf8()];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

static XML_TOOL_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<tool_call\s+name="([^"]+)"\s*>(.*?)</tool_call>"#)
        .expect("xml tool-call pattern compiles")
});

/// Parses `<tool_call name="...">{...}</tool_call>` blocks from text output.
pub fn parse_xml_tool_calls(text: &str) -> Vec<ToolCall> {
    XML_TOOL_CALL
        .captures_iter(text)
        .enumerate()
        .map(|(i, cap)| ToolCall::new(format!("xml-{i}"), &cap[1], cap[2].trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_call(name: &str, arguments: &str) -> ResponseMessage {
        ResponseMessage {
            content: String::new(),
            tool_calls: vec![ToolCall::new("c1", name, arguments)],
        }
    }

    fn text_message(content: &str) -> ResponseMessage {
        ResponseMessage {
            content: content.to_string(),
            tool_calls: Vec::new(),
        }
    }

    #[test]
    fn emit_probe_scores_exact_call() {
        let req = build_tool_emit();
        let eval = eval_tool_emit(&req, &message_with_call("ping", r#"{"value":"hello"}"#));
        assert!(eval.pass);
        assert_eq!(eval.score, 100);
    }

    #[test]
    fn schema_adherence_penalizes_legacy_field() {
        let req = build_schema_adherence();
        let eval = eval_schema_adherence(
            &req,
            &message_with_call("ping", r#"{"value":"hello","message":"hello","timestamp":1234567890}"#),
        );
        assert!(!eval.pass);
        assert!(eval.score <= 30);
    }

    #[test]
    fn schema_adherence_full_marks_for_new_fields() {
        let req = build_schema_adherence();
        let eval = eval_schema_adherence(
            &req,
            &message_with_call("ping", r#"{"message":"hello","timestamp":1234567890}"#),
        );
        assert!(eval.pass);
        assert_eq!(eval.score, 100);
    }

    #[test]
    fn reorder_probe_is_order_insensitive() {
        let req = build_schema_reorder();
        let eval = eval_schema_reorder(
            &req,
            &message_with_call("ping", r#"{"timestamp":1234567890,"message":"hello"}"#),
        );
        assert_eq!(eval.score, 100);
    }

    #[test]
    fn suppression_rejects_any_tool_call() {
        let req = build_tool_suppression();
        let eval = eval_tool_suppression(&req, &message_with_call("ping", "{}"));
        assert!(!eval.pass);
        assert_eq!(eval.score, 0);

        let ok = eval_tool_suppression(&req, &text_message("OK"));
        assert!(ok.pass);
        assert_eq!(ok.score, 100);

        let ok_lower = eval_tool_suppression(&req, &text_message("ok."));
        assert_eq!(ok_lower.score, 100);
    }

    #[test]
    fn near_identical_selection_rewards_semantic_qualifier() {
        let req = build_near_identical_selection();
        let fresh = eval_near_identical_selection(&req, &message_with_call("get_data", "{}"));
        assert_eq!(fresh.score, 100);
        let cached =
            eval_near_identical_selection(&req, &message_with_call("get_cached_data", "{}"));
        assert!(!cached.pass);
    }

    #[test]
    fn multi_emit_needs_two_calls() {
        let req = build_multi_tool_emit();
        let msg = ResponseMessage {
            content: String::new(),
            tool_calls: vec![
                ToolCall::new("1", "ping", r#"{"value":"a"}"#),
                ToolCall::new("2", "ping", r#"{"value":"b"}"#),
            ],
        };
        assert_eq!(eval_multi_tool_emit(&req, &msg).score, 100);
        assert_eq!(
            eval_multi_tool_emit(&req, &message_with_call("ping", r#"{"value":"a"}"#)).score,
            40
        );
    }

    #[test]
    fn nested_arguments_rewards_structure() {
        let req = build_nested_arguments();
        let eval = eval_nested_arguments(
            &req,
            &message_with_call(
                "create_task",
                r#"{"title":"Fix login","assignee":{"name":"Dana","id":7},"options":{"notify":true}}"#,
            ),
        );
        assert_eq!(eval.score, 100);
        let flat = eval_nested_arguments(
            &req,
            &message_with_call("create_task", r#"{"title":"Fix login","assignee":"Dana"}"#),
        );
        assert!(flat.score <= 30);
    }

    #[test]
    fn intent_extraction_reads_first_json() {
        let req = build_intent_extraction();
        let eval = eval_intent_extraction(
            &req,
            &text_message("Sure: {\"action\":\"read_file\",\"target\":\"config.json\"}"),
        );
        assert_eq!(eval.score, 100);
        assert!(!eval_intent_extraction(&req, &text_message("no json here")).pass);
    }

    #[test]
    fn continuity_probe_checks_recalled_port() {
        let req = build_context_continuity();
        assert!(eval_context_continuity(&req, &text_message("8443")).pass);
        assert!(!eval_context_continuity(&req, &text_message("8080")).pass);
    }

    #[test]
    fn first_json_object_handles_nesting_and_strings() {
        let v = first_json_object("x {\"a\": {\"b\": \"}\"}} y").unwrap();
        assert_eq!(v["a"]["b"], "}");
        assert!(first_json_object("no braces").is_none());
    }

    #[test]
    fn xml_tool_calls_parse() {
        let calls = parse_xml_tool_calls(
            "text <tool_call name=\"ping\">{\"value\":\"hello\"}</tool_call> more",
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "ping");
        assert_eq!(calls[0].parsed_arguments().unwrap()["value"], "hello");
    }

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<_> = CATALOG.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CATALOG.len());
    }
}
