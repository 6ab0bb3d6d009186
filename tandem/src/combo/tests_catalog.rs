//! The tiered combo test set.
//!
//! Each test sends one user turn through a pair's dual pipeline and scores
//! what came out the far end. Tiers gate cost: simple runs first and feeds
//! the qualifying gate.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::message::ToolSpec;
use crate::router::RouteResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComboTier {
    Simple,
    Medium,
    Complex,
}

/// Verdict for one combo test.
#[derive(Clone, Debug)]
pub struct ComboEvaluation {
    pub pass: bool,
    pub score: u32,
    pub details: String,
}

impl ComboEvaluation {
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

pub struct ComboTest {
    pub name: &'static str,
    pub tier: ComboTier,
    pub category: &'static str,
    pub user_message: &'static str,
    pub tools: fn() -> Vec<ToolSpec>,
    pub evaluate: fn(&RouteResult) -> ComboEvaluation,
}

fn read_write_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "read_file",
            "Reads a file from disk.",
            json!({"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}),
        ),
        ToolSpec::new(
            "write_file",
            "Writes content to a file.",
            json!({"type":"object","properties":{"path":{"type":"string"},"content":{"type":"string"}},"required":["path","content"]}),
        ),
    ]
}

fn ping_tools() -> Vec<ToolSpec> {
    vec![ToolSpec::new(
        "ping",
        "Sends a ping with the given payload.",
        json!({"type":"object","properties":{"value":{"type":"string"}},"required":["value"]}),
    )]
}

fn no_tools() -> Vec<ToolSpec> {
    Vec::new()
}

fn search_tools() -> Vec<ToolSpec> {
    let mut tools = read_write_tools();
    tools.push(ToolSpec::new(
        "search_code",
        "Searches the codebase for a pattern.",
        json!({"type":"object","properties":{"query":{"type":"string"}},"required":["query"]}),
    ));
    tools
}

fn task_tools() -> Vec<ToolSpec> {
    vec![ToolSpec::new(
        "create_task",
        "Creates a work item.",
        json!({
            "type":"object",
            "properties":{
                "title":{"type":"string"},
                "assignee":{"type":"object","properties":{"name":{"type":"string"},"id":{"type":"number"}}},
                "options":{"type":"object","properties":{"notify":{"type":"boolean"}}}
            },
            "required":["title","assignee"]
        }),
    )]
}

fn edit_tools() -> Vec<ToolSpec> {
    vec![ToolSpec::new(
        "edit_file",
        "Applies text edits to a file.",
        json!({
            "type":"object",
            "properties":{
                "path":{"type":"string"},
                "edits":{"type":"array","items":{"type":"object","properties":{
                    "oldText":{"type":"string"},"newText":{"type":"string"}}}}
            },
            "required":["path","edits"]
        }),
    )]
}

fn expect_single_call(result: &RouteResult, tool: &str, param_needle: &str) -> ComboEvaluation {
    match result.tool_calls.first() {
        None => ComboEvaluation::fail(0, "no tool call reached the client"),
        Some(call) if call.name == tool => {
            if call.arguments.contains(param_needle) {
                ComboEvaluation::pass(100, format!("{tool} with expected parameters"))
            } else {
                ComboEvaluation::pass(70, format!("{tool} called, parameters off"))
            }
        }
        Some(call) => ComboEvaluation::fail(20, format!("called {} instead of {tool}", call.name)),
    }
}

fn eval_simple_read(result: &RouteResult) -> ComboEvaluation {
    expect_single_call(result, "read_file", "src/main.rs")
}

fn eval_simple_ping(result: &RouteResult) -> ComboEvaluation {
    expect_single_call(result, "ping", "check")
}

fn eval_simple_discipline(result: &RouteResult) -> ComboEvaluation {
    if !result.tool_calls.is_empty() {
        return ComboEvaluation::fail(0, "tools used despite the instruction");
    }
    if result.final_response.content().is_empty() {
        ComboEvaluation::fail(30, "no answer produced")
    } else {
        ComboEvaluation::pass(100, "answered without tools")
    }
}

fn eval_medium_selection(result: &RouteResult) -> ComboEvaluation {
    expect_single_call(result, "search_code", "load_config")
}

fn eval_medium_params(result: &RouteResult) -> ComboEvaluation {
    let Some(call) = result.tool_calls.iter().find(|c| c.name == "create_task") else {
        return ComboEvaluation::fail(0, "create_task not called");
    };
    match call.parsed_arguments() {
        Some(args) if args["assignee"].is_object() => {
            ComboEvaluation::pass(100, "nested parameters preserved")
        }
        Some(_) => ComboEvaluation::fail(50, "parameters flattened"),
        None => ComboEvaluation::fail(20, "arguments not valid JSON"),
    }
}

fn eval_complex_sequential(result: &RouteResult) -> ComboEvaluation {
    if result.tool_calls.is_empty() {
        return ComboEvaluation::fail(0, "no tool calls for a multi-step request");
    }
    let first_is_search = result.tool_calls[0].name == "search_code";
    let multi_planned = result
        .intent
        .as_ref()
        .is_some_and(|i| !i.steps.is_empty() || result.tool_calls.len() >= 2);
    match (first_is_search, multi_planned) {
        (true, true) => ComboEvaluation::pass(100, "search first, multi-step planned"),
        (true, false) => ComboEvaluation::pass(70, "search first, single step"),
        _ => ComboEvaluation::fail(30, "wrong opening move"),
    }
}

fn eval_complex_edit(result: &RouteResult) -> ComboEvaluation {
    let Some(call) = result.tool_calls.iter().find(|c| c.name == "edit_file") else {
        return ComboEvaluation::fail(0, "edit_file not called");
    };
    match call.parsed_arguments() {
        Some(args) if args["edits"].is_array() => {
            ComboEvaluation::pass(100, "edits array shaped correctly")
        }
        Some(_) => ComboEvaluation::fail(50, "edits not an array"),
        None => ComboEvaluation::fail(20, "arguments not valid JSON"),
    }
}

/// The full test set, tier-ordered.
pub static COMBO_TESTS: &[ComboTest] = &[
    ComboTest {
        name: "simple_file_read",
        tier: ComboTier::Simple,
        category: "file",
        user_message: "Read the file src/main.rs.",
        tools: read_write_tools,
        evaluate: eval_simple_read,
    },
    ComboTest {
        name: "simple_ping",
        tier: ComboTier::Simple,
        category: "basic",
        user_message: "Send a ping with value 'check'.",
        tools: ping_tools,
        evaluate: eval_simple_ping,
    },
    ComboTest {
        name: "simple_discipline",
        tier: ComboTier::Simple,
        category: "discipline",
        user_message: "What is 2+2? Answer directly, do not use tools.",
        tools: no_tools,
        evaluate: eval_simple_discipline,
    },
    ComboTest {
        name: "medium_tool_selection",
        tier: ComboTier::Medium,
        category: "selection",
        user_message: "Search the code for where 'load_config' is called.",
        tools: search_tools,
        evaluate: eval_medium_selection,
    },
    ComboTest {
        name: "medium_nested_params",
        tier: ComboTier::Medium,
        category: "parameters",
        user_message: "Create a task titled 'Fix login' assigned to Dana (id 7).",
        tools: task_tools,
        evaluate: eval_medium_params,
    },
    ComboTest {
        name: "complex_sequential",
        tier: ComboTier::Complex,
        category: "coordination",
        user_message: "Search the code for 'init', then read the most relevant file you find.",
        tools: search_tools,
        evaluate: eval_complex_sequential,
    },
    ComboTest {
        name: "complex_edit",
        tier: ComboTier::Complex,
        category: "editing",
        user_message: "Replace 'foo' with 'bar' in src/lib.rs.",
        tools: edit_tools,
        evaluate: eval_complex_edit,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered_simple_first() {
        let first_medium = COMBO_TESTS
            .iter()
            .position(|t| t.tier == ComboTier::Medium)
            .unwrap();
        assert!(COMBO_TESTS[..first_medium]
            .iter()
            .all(|t| t.tier == ComboTier::Simple));
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = COMBO_TESTS.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), COMBO_TESTS.len());
    }

    #[test]
    fn simple_tier_has_enough_tests_for_the_gate() {
        assert!(COMBO_TESTS.iter().filter(|t| t.tier == ComboTier::Simple).count() >= 3);
    }
}
