//! The Intent record: the typed contract between planner and executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::probe::catalog::first_json_object;

pub const INTENT_SCHEMA_VERSION: u32 = 1;

/// What the planner decided the turn needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    CallTool,
    Respond,
    AskClarification,
    MultiStep,
}

/// One step of a multi-step plan.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntentStep {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Direct answer text for `action: respond`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Clarifying question for `action: ask_clarification`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// The planner's decision for one turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub action: IntentAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<IntentStep>,
    #[serde(default)]
    pub metadata: IntentMetadata,
}

fn default_schema_version() -> u32 {
    INTENT_SCHEMA_VERSION
}

impl Intent {
    /// The safe fallback when the planner output could not be parsed.
    pub fn fallback(reason: &str) -> Self {
        Self {
            schema_version: INTENT_SCHEMA_VERSION,
            action: IntentAction::Respond,
            tool: None,
            parameters: None,
            steps: Vec::new(),
            metadata: IntentMetadata {
                reasoning: Some(reason.to_string()),
                ..IntentMetadata::default()
            },
        }
    }

    /// Serialized form handed to the executor as its user content.
    pub fn serialized(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Extracts the first JSON object in the planner's reply and shapes it into
/// an [`Intent`]. Anything unusable falls back to `action: respond`.
pub fn parse_intent(text: &str) -> Intent {
    let Some(value) = first_json_object(text) else {
        return Intent::fallback("could not parse");
    };
    match serde_json::from_value::<Intent>(value.clone()) {
        Ok(intent) => {
            // A call_tool intent without a tool name is malformed.
            if intent.action == IntentAction::CallTool && intent.tool.is_none() {
                Intent::fallback("could not parse")
            } else {
                intent
            }
        }
        Err(_) => Intent::fallback("could not parse"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_tool_intent() {
        let text = r#"Here is my plan:
            {"action":"call_tool","tool":"read_file","parameters":{"path":"src/index.ts"},
             "metadata":{"reasoning":"user asked for a file"}}"#;
        let intent = parse_intent(text);
        assert_eq!(intent.action, IntentAction::CallTool);
        assert_eq!(intent.tool.as_deref(), Some("read_file"));
        assert_eq!(intent.parameters.unwrap()["path"], "src/index.ts");
        assert_eq!(intent.schema_version, INTENT_SCHEMA_VERSION);
    }

    #[test]
    fn no_json_falls_back_to_respond() {
        let intent = parse_intent("I think we should read the file.");
        assert_eq!(intent.action, IntentAction::Respond);
        assert_eq!(intent.metadata.reasoning.as_deref(), Some("could not parse"));
    }

    #[test]
    fn call_tool_without_tool_is_malformed() {
        let intent = parse_intent(r#"{"action":"call_tool"}"#);
        assert_eq!(intent.action, IntentAction::Respond);
    }

    #[test]
    fn multi_step_intent_keeps_step_order() {
        let intent = parse_intent(
            r#"{"action":"multi_step","steps":[
                {"tool":"search_code","parameters":{"query":"port"}},
                {"tool":"read_file","parameters":{"path":"config.rs"}}
            ]}"#,
        );
        assert_eq!(intent.action, IntentAction::MultiStep);
        assert_eq!(intent.steps.len(), 2);
        assert_eq!(intent.steps[0].tool, "search_code");
        assert_eq!(intent.steps[1].tool, "read_file");
    }

    #[test]
    fn serialized_intent_round_trips() {
        let intent = parse_intent(r#"{"action":"respond","metadata":{"response":"hi"}}"#);
        let text = intent.serialized();
        let back = parse_intent(&text);
        assert_eq!(back.action, IntentAction::Respond);
        assert_eq!(back.metadata.response.as_deref(), Some("hi"));
    }
}
