//! System prompts for the planning and execution stages.

use crate::prosthetic::Prosthetic;

/// Fixed intent-classifier skeleton for the planning call. The main model's
/// prosthetic, when present, is appended below it.
pub const INTENT_CLASSIFIER_PROMPT: &str = "\
You are the planning stage of a two-model pipeline. Read the user's request \
and decide what should happen next. Respond with ONE JSON object and nothing \
else, in this shape:

{
  \"action\": \"call_tool\" | \"respond\" | \"ask_clarification\" | \"multi_step\",
  \"tool\": \"<tool name, for call_tool>\",
  \"parameters\": { },
  \"steps\": [ {\"tool\": \"...\", \"parameters\": { }} ],
  \"metadata\": {
    \"reasoning\": \"<one sentence>\",
    \"response\": \"<answer text, for respond>\",
    \"question\": \"<clarifying question, for ask_clarification>\"
  }
}

Rules:
- Use \"call_tool\" when exactly one tool realizes the request.
- Use \"multi_step\" with an ordered steps list when several calls are needed.
- Use \"respond\" for answers that need no tools; put the answer in metadata.response.
- Use \"ask_clarification\" when the request is ambiguous; put the question in metadata.question.
- Never invent tool names.";

/// Standard tool-use preamble for the execution call. The executor's
/// prosthetic, when present, is appended below it.
pub const EXECUTOR_PREAMBLE: &str = "\
You are the execution stage of a two-model pipeline. You receive a structured \
intent describing what to do. Realize it with the tools available to you: \
emit the tool calls that carry it out, with exact parameter names from each \
tool's schema. If the intent's action is multi_step, emit the calls in step \
order. Do not answer in prose when a tool call is expected.";

/// Neutral prompt for the second-chance response call when a respond-intent
/// carried no answer text.
pub const NEUTRAL_RESPONSE_PROMPT: &str =
    "You are a helpful coding assistant. Answer the user's request directly and concisely.";

/// Planner system prompt: skeleton plus optional prosthetic.
pub fn planner_system_prompt(prosthetic: Option<&Prosthetic>) -> String {
    compose(INTENT_CLASSIFIER_PROMPT, prosthetic)
}

/// Executor system prompt: preamble plus optional prosthetic and an optional
/// addendum describing out-of-band tool extensions.
pub fn executor_system_prompt(
    prosthetic: Option<&Prosthetic>,
    extensions_addendum: Option<&str>,
) -> String {
    let mut prompt = compose(EXECUTOR_PREAMBLE, prosthetic);
    if let Some(addendum) = extensions_addendum {
        prompt.push_str("\n\n");
        prompt.push_str(addendum);
    }
    prompt
}

fn compose(base: &str, prosthetic: Option<&Prosthetic>) -> String {
    match prosthetic {
        Some(p) => format!("{base}\n\nAdditional operating guidance:\n{}", p.text),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prosthetic_is_appended_after_skeleton() {
        let p = Prosthetic::new("Always use exact field names.", 2);
        let prompt = planner_system_prompt(Some(&p));
        assert!(prompt.starts_with(INTENT_CLASSIFIER_PROMPT));
        assert!(prompt.ends_with("Always use exact field names."));
    }

    #[test]
    fn no_prosthetic_means_bare_skeleton() {
        assert_eq!(planner_system_prompt(None), INTENT_CLASSIFIER_PROMPT);
    }

    #[test]
    fn executor_addendum_comes_last() {
        let p = Prosthetic::new("Prefer one call.", 1);
        let prompt = executor_system_prompt(Some(&p), Some("Extended tools:\n- rag_query"));
        let prosthetic_at = prompt.find("Prefer one call.").unwrap();
        let addendum_at = prompt.find("Extended tools:").unwrap();
        assert!(prosthetic_at < addendum_at);
    }
}
