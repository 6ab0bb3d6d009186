//! Capability probing: a scripted battery of synthetic interactions.
//!
//! The catalog is a flat list of probe descriptors (prompt builder plus
//! expected-outcome evaluator); the harness runs each against the shared
//! chat seam, applies bad-output heuristics, and aggregates scores. Probes
//! against one model run strictly in sequence because local inference hosts
//! reload context serially; different models may be probed in parallel by
//! the caller.

pub mod catalog;
pub mod heuristics;
pub mod latency;

pub use catalog::{ProbeCategory, ProbeRequest, ProbeSpec, CATALOG};
pub use latency::{LatencyCurve, LatencyPoint, SpeedRating};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::message::Message;
use crate::provider::{CallOptions, ChatBackend, ResponseMessage, ToolChoiceMode};
use crate::score::{self, ModelRole, RawScores};

/// Catalog revision; bumped when probes or scoring change shape.
pub const TEST_VERSION: u32 = 3;

/// Built-in level-1 corrective fragment used by the trainability smoke test
/// when the prosthetic store has nothing for the model.
pub const FALLBACK_TRAINING_FRAGMENT: &str = "Follow tool instructions exactly. \
If the request says not to call tools, do not call any tool and reply in plain text only.";

/// Capability axis a probe feeds. Order is load-bearing: used as an index
/// during aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    ToolAccuracy = 0,
    IntentRecognition = 1,
    RagUsage = 2,
    Reasoning = 3,
    BugDetection = 4,
    CodeUnderstanding = 5,
    SelfCorrection = 6,
    AntiPattern = 7,
    Trainability = 8,
}

/// Which calling convention a tool probe ended up succeeding with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolFormat {
    OpenAi,
    Xml,
    None,
}

/// Outcome of one probe. Immutable after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeResult {
    pub test_name: String,
    pub axis: Axis,
    pub pass: bool,
    /// 0–100.
    pub score: u32,
    pub latency_ms: u64,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_format: Option<ToolFormat>,
}

/// Options for one profile run.
#[derive(Clone, Debug)]
pub struct ProbeOptions {
    /// Probe categories to run; `None` runs everything.
    pub categories: Option<Vec<ProbeCategory>>,
    pub timeout: Duration,
    pub include_latency_sweep: bool,
    /// Upper bound for the context sweep, when the model's max is known.
    pub model_max_context: Option<u32>,
    /// Overall score of a baseline model; axes are normalized against it
    /// when it scored below 95.
    pub baseline_overall: Option<u32>,
    /// Corrective fragment for the trainability smoke test; the built-in
    /// fallback is used when absent.
    pub prosthetic_fragment: Option<String>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            categories: None,
            timeout: Duration::from_secs(30),
            include_latency_sweep: false,
            model_max_context: None,
            baseline_overall: None,
            prosthetic_fragment: None,
        }
    }
}

/// Aggregate of one full probe run against one model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileResult {
    pub model_id: String,
    pub provider: String,
    pub test_version: u32,
    pub tested_at: DateTime<Utc>,
    pub probes: Vec<ProbeResult>,
    pub scores: RawScores,
    pub overall: u32,
    pub role: ModelRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyCurve>,
}

fn probe_call_options(timeout: Duration, tool_choice: ToolChoiceMode) -> CallOptions {
    CallOptions {
        tool_choice,
        ..CallOptions::deterministic(timeout)
    }
}

/// Runs one catalog probe, including the XML fallback for emit-style probes.
async fn run_probe(
    backend: &dyn ChatBackend,
    model: &str,
    spec: &ProbeSpec,
    timeout: Duration,
) -> (ProbeResult, f64) {
    let request = (spec.build)();
    let opts = probe_call_options(timeout, request.tool_choice);
    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(request.tools.as_slice())
    };

    let response = match backend.chat(model, &request.messages(), tools, &opts).await {
        Ok(r) => r,
        Err(e) => {
            warn!(model, probe = spec.name, error = %e, "probe call failed");
            return (
                ProbeResult {
                    test_name: spec.name.to_string(),
                    axis: spec.axis,
                    pass: false,
                    score: 0,
                    latency_ms: 0,
                    details: "provider call failed".to_string(),
                    error: Some(e.to_string()),
                    tool_format: None,
                },
                0.0,
            );
        }
    };

    let latency_ms = response.latency_ms;
    let message = response.message().unwrap_or_default();
    let mut evaluation = (spec.evaluate)(&request, &message);
    let mut tool_format = tool_format_for(spec, &message);

    // Emit-style probes get a second chance with a textual XML schema; the
    // profile records whichever convention worked.
    if spec.xml_fallback && message.tool_calls.is_empty() {
        if let Some((xml_eval, xml_latency, xml_message)) =
            run_xml_fallback(backend, model, spec, &request, timeout).await
        {
            if xml_eval.score > evaluation.score {
                evaluation = xml_eval;
                tool_format = Some(ToolFormat::Xml);
                return finish_probe(
                    spec,
                    evaluation,
                    latency_ms + xml_latency,
                    tool_format,
                    &xml_message,
                );
            }
        }
    }

    finish_probe(spec, evaluation, latency_ms, tool_format, &message)
}

fn tool_format_for(spec: &ProbeSpec, message: &ResponseMessage) -> Option<ToolFormat> {
    if spec.category != ProbeCategory::Tool {
        return None;
    }
    if message.tool_calls.is_empty() {
        Some(ToolFormat::None)
    } else {
        Some(ToolFormat::OpenAi)
    }
}

fn finish_probe(
    spec: &ProbeSpec,
    evaluation: catalog::ProbeEvaluation,
    latency_ms: u64,
    tool_format: Option<ToolFormat>,
    message: &ResponseMessage,
) -> (ProbeResult, f64) {
    let bad = heuristics::inspect(message);
    let penalty = bad.penalty();
    let score = if penalty > 0.0 {
        evaluation.score.min(40)
    } else {
        evaluation.score
    };
    let mut details = evaluation.details;
    if penalty > 0.0 {
        details.push_str(&format!("; bad output: {}", bad.describe()));
    }
    (
        ProbeResult {
            test_name: spec.name.to_string(),
            axis: spec.axis,
            pass: evaluation.pass && penalty == 0.0,
            score,
            latency_ms,
            details,
            error: None,
            tool_format,
        },
        penalty,
    )
}

/// XML retry: same user prompt, textual tool-call schema, no structured tools.
async fn run_xml_fallback(
    backend: &dyn ChatBackend,
    model: &str,
    spec: &ProbeSpec,
    request: &ProbeRequest,
    timeout: Duration,
) -> Option<(catalog::ProbeEvaluation, u64, ResponseMessage)> {
    let schema_lines: Vec<String> = request
        .tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.parameters))
        .collect();
    let system = format!(
        "You cannot use structured tool calls. To call a tool, output exactly:\n\
         <tool_call name=\"TOOL_NAME\">{{JSON arguments}}</tool_call>\n\
         Available tools:\n{}",
        schema_lines.join("\n")
    );
    let messages = vec![Message::system(system), Message::user(&request.user)];
    let opts = probe_call_options(timeout, ToolChoiceMode::Auto);
    let response = backend.chat(model, &messages, None, &opts).await.ok()?;
    let content = response.content();
    let calls = catalog::parse_xml_tool_calls(&content);
    if calls.is_empty() {
        return None;
    }
    let synthetic = ResponseMessage {
        content,
        tool_calls: calls,
    };
    let evaluation = (spec.evaluate)(request, &synthetic);
    Some((evaluation, response.latency_ms, synthetic))
}

/// Trainability smoke test: one failure-prone instruction, run bare and with
/// a level-1 corrective fragment injected; the score measures how much the
/// fragment moves behavior.
async fn run_trainability(
    backend: &dyn ChatBackend,
    model: &str,
    fragment: &str,
    timeout: Duration,
) -> ProbeResult {
    let spec = catalog::suppression_spec();
    let bare = run_probe(backend, model, spec, timeout).await.0;

    let request = (spec.build)();
    let mut messages = vec![Message::system(fragment)];
    messages.extend(request.messages());
    let opts = probe_call_options(timeout, request.tool_choice);
    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(request.tools.as_slice())
    };
    let assisted_score = match backend.chat(model, &messages, tools, &opts).await {
        Ok(r) => {
            let message = r.message().unwrap_or_default();
            (spec.evaluate)(&request, &message).score
        }
        Err(_) => 0,
    };

    // Already-compliant models leave nothing to measure; score neutral-high.
    let score = if bare.score >= 90 {
        75
    } else {
        (50 + i64::from(assisted_score) - i64::from(bare.score)).clamp(0, 100) as u32
    };
    ProbeResult {
        test_name: "trainability_smoke".to_string(),
        axis: Axis::Trainability,
        pass: score >= 50,
        score,
        latency_ms: bare.latency_ms,
        details: format!("bare {} → assisted {}", bare.score, assisted_score),
        error: None,
        tool_format: None,
    }
}

/// Runs the probe battery against one model and aggregates the profile.
pub async fn run_profile(
    backend: &dyn ChatBackend,
    model: &str,
    options: &ProbeOptions,
) -> ProfileResult {
    info!(model, "probe run starting");
    let selected = |category: ProbeCategory| {
        options
            .categories
            .as_ref()
            .map(|cs| cs.contains(&category))
            .unwrap_or(true)
    };

    let mut probes = Vec::new();
    let mut penalties = Vec::new();
    for spec in CATALOG.iter() {
        if !selected(spec.category) {
            continue;
        }
        let (result, penalty) = run_probe(backend, model, spec, options.timeout).await;
        debug!(probe = %result.test_name, score = result.score, pass = result.pass, "probe done");
        penalties.push(penalty);
        probes.push(result);
    }

    if selected(ProbeCategory::Tool) {
        let fragment = options
            .prosthetic_fragment
            .as_deref()
            .unwrap_or(FALLBACK_TRAINING_FRAGMENT);
        probes.push(run_trainability(backend, model, fragment, options.timeout).await);
    }

    let latency = if options.include_latency_sweep && selected(ProbeCategory::Strategic) {
        Some(latency::sweep(backend, model, options.timeout, options.model_max_context).await)
    } else {
        None
    };

    let mut scores = RawScores::from_probes(&probes);
    if !penalties.is_empty() {
        scores.anti_pattern_penalty =
            penalties.iter().sum::<f64>() / penalties.len() as f64;
    }
    if let Some(baseline) = options.baseline_overall {
        scores.normalize_against_baseline(baseline);
    }
    let overall = scores.overall(&score::AxisPresence::from_probes(&probes));
    let role = score::recommend_role(&scores, overall);
    info!(model, overall, ?role, "probe run complete");

    ProfileResult {
        model_id: model.to_string(),
        provider: backend.provider_name().to_string(),
        test_version: TEST_VERSION,
        tested_at: Utc::now(),
        probes,
        scores,
        overall,
        role,
        latency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Reply, ScriptedBackend};

    #[tokio::test]
    async fn run_profile_scores_every_selected_probe() {
        let backend = ScriptedBackend::with_fixed("plain text answer");
        let options = ProbeOptions {
            categories: Some(vec![ProbeCategory::Reasoning]),
            ..ProbeOptions::default()
        };
        let profile = run_profile(&backend, "m", &options).await;
        let reasoning_count = CATALOG
            .iter()
            .filter(|s| s.category == ProbeCategory::Reasoning)
            .count();
        assert_eq!(profile.probes.len(), reasoning_count);
        assert!(profile.overall <= 100);
        assert_eq!(profile.test_version, TEST_VERSION);
    }

    #[tokio::test]
    async fn provider_errors_become_zero_score_results() {
        let backend = ScriptedBackend::with_handler(Box::new(|_| Reply::Timeout));
        let options = ProbeOptions {
            categories: Some(vec![ProbeCategory::Reasoning]),
            ..ProbeOptions::default()
        };
        let profile = run_profile(&backend, "m", &options).await;
        assert!(profile.probes.iter().all(|p| !p.pass && p.score == 0));
        assert!(profile.probes.iter().all(|p| p.error.is_some()));
    }

    #[tokio::test]
    async fn suppression_scenario_scores_one_hundred() {
        // A model that answers "OK" and never calls the exposed tool.
        let backend = ScriptedBackend::with_fixed("OK");
        let spec = catalog::suppression_spec();
        let (result, penalty) = run_probe(&backend, "m", spec, Duration::from_secs(5)).await;
        assert!(result.pass);
        assert_eq!(result.score, 100);
        assert_eq!(result.tool_format, Some(ToolFormat::None));
        assert_eq!(penalty, 0.0);
    }

    #[tokio::test]
    async fn trainability_neutral_high_when_already_compliant() {
        let backend = ScriptedBackend::with_fixed("OK");
        let result =
            run_trainability(&backend, "m", FALLBACK_TRAINING_FRAGMENT, Duration::from_secs(5))
                .await;
        assert_eq!(result.score, 75);
        assert_eq!(result.axis, Axis::Trainability);
    }

    #[tokio::test]
    async fn leaked_control_tokens_downgrade_score() {
        let backend = ScriptedBackend::with_fixed("OK <|im_end|>");
        let spec = catalog::suppression_spec();
        let (result, penalty) = run_probe(&backend, "m", spec, Duration::from_secs(5)).await;
        assert!(penalty > 0.0);
        assert!(result.score <= 40);
        assert!(!result.pass);
    }
}
