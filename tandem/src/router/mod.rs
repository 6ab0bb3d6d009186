//! Intent router: single-model passthrough or planning → execution pipeline.
//!
//! In dual mode a turn is decomposed into a planning call on the main model
//! (no tools, intent-classifier prompt) and an execution call on the
//! executor model (tools exposed, intent as user content). Planning strictly
//! precedes execution; the executor call never starts before the intent has
//! been parsed. Provider failures never cross this boundary as errors: they
//! become flagged phases plus failure-log entries.
//!
//! The router holds no persistent state beyond its configuration snapshot;
//! profiles and prosthetics are read per turn.

mod intent;
mod prompts;

pub use intent::{parse_intent, Intent, IntentAction, IntentMetadata, IntentStep};
pub use prompts::{
    executor_system_prompt, planner_system_prompt, EXECUTOR_PREAMBLE, INTENT_CLASSIFIER_PROMPT,
    NEUTRAL_RESPONSE_PROMPT,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::failure::{FailureCategory, FailureLog, LogFailureParams};
use crate::message::{Message, Role, ToolCall, ToolSpec};
use crate::provider::{CallOptions, ChatBackend, ChatResponse, ToolChoiceMode};
use crate::prosthetic::ProstheticStore;
use crate::registry::CapabilityRegistry;
use crate::score::ModelRole;

/// Router configuration snapshot for a turn.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub main_model: Option<String>,
    pub executor_model: Option<String>,
    pub enable_dual: bool,
    /// Per-provider-call budget; the per-turn deadline caps it further.
    pub timeout: Duration,
    pub temperature: Option<f32>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            main_model: None,
            executor_model: None,
            enable_dual: false,
            timeout: Duration::from_secs(60),
            temperature: None,
        }
    }
}

/// One routed turn's input.
#[derive(Clone, Debug)]
pub struct RouteRequest {
    /// Model the client named; used for single mode and response echo.
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    /// Per-turn deadline; expiry during planning skips execution.
    pub deadline: Option<Instant>,
    /// IDE-mapper addendum describing out-of-band tool extensions.
    pub executor_addendum: Option<String>,
}

impl RouteRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            deadline: None,
            executor_addendum: None,
        }
    }

    fn last_user_content(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    Single,
    Dual,
}

/// One pipeline stage's outcome, for observability and tests.
#[derive(Clone, Debug, Serialize)]
pub struct PhaseOutcome {
    pub name: &'static str,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct RouteLatency {
    pub main_ms: u64,
    pub executor_ms: u64,
    pub total_ms: u64,
}

/// The routed turn's result.
#[derive(Clone, Debug)]
pub struct RouteResult {
    pub mode: RouteMode,
    pub main_response: Option<ChatResponse>,
    pub executor_response: Option<ChatResponse>,
    pub final_response: ChatResponse,
    pub tool_calls: Vec<ToolCall>,
    pub latency: RouteLatency,
    pub phases: Vec<PhaseOutcome>,
    pub intent: Option<Intent>,
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("configuration: {0}")]
    Configuration(String),
}

/// The dispatcher. Cheap to construct per turn from the core handle.
pub struct IntentRouter {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<CapabilityRegistry>,
    prosthetics: Arc<ProstheticStore>,
    failure_log: Arc<FailureLog>,
    config: RouterConfig,
}

impl IntentRouter {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        registry: Arc<CapabilityRegistry>,
        prosthetics: Arc<ProstheticStore>,
        failure_log: Arc<FailureLog>,
        config: RouterConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            prosthetics,
            failure_log,
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Remaining call budget under the per-turn deadline.
    fn call_timeout(&self, deadline: Option<Instant>) -> Duration {
        match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()).min(self.config.timeout),
            None => self.config.timeout,
        }
    }

    fn deadline_spent(deadline: Option<Instant>) -> bool {
        deadline.is_some_and(|d| Instant::now() >= d)
    }

    async fn log_failure(&self, request: &RouteRequest, category: FailureCategory, error: String) {
        let params = LogFailureParams {
            model_id: self
                .config
                .main_model
                .clone()
                .unwrap_or_else(|| request.model.clone()),
            executor_model_id: self.config.executor_model.clone(),
            category,
            error,
            query: request.last_user_content(),
            conversation_depth: request.messages.len() as u32,
        };
        if let Err(e) = self.failure_log.log_failure(params).await {
            warn!(error = %e, "failure-log write failed");
        }
    }

    /// Routes one turn.
    pub async fn route(&self, request: RouteRequest) -> Result<RouteResult, RouterError> {
        let dual_ready = self.config.enable_dual
            && self.config.main_model.is_some()
            && self.config.executor_model.is_some();
        if dual_ready {
            self.route_dual(request).await
        } else {
            self.route_single(request).await
        }
    }

    async fn route_single(&self, request: RouteRequest) -> Result<RouteResult, RouterError> {
        let model = self
            .config
            .main_model
            .clone()
            .or_else(|| self.config.executor_model.clone())
            .unwrap_or_else(|| request.model.clone());
        if model.is_empty() {
            return Err(RouterError::Configuration("missing model id".to_string()));
        }
        let opts = CallOptions {
            timeout: self.call_timeout(request.deadline),
            temperature: self.config.temperature,
            ..CallOptions::default()
        };
        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.as_slice())
        };

        match self.backend.chat(&model, &request.messages, tools, &opts).await {
            Ok(response) => {
                let tool_calls = response.tool_calls();
                let latency_ms = response.latency_ms;
                Ok(RouteResult {
                    mode: RouteMode::Single,
                    main_response: None,
                    executor_response: None,
                    final_response: response,
                    tool_calls,
                    latency: RouteLatency {
                        total_ms: latency_ms,
                        ..RouteLatency::default()
                    },
                    phases: vec![PhaseOutcome {
                        name: "response",
                        latency_ms,
                        error: None,
                    }],
                    intent: None,
                })
            }
            Err(e) => {
                self.log_failure(&request, FailureCategory::Unknown, e.failure_text())
                    .await;
                Ok(RouteResult {
                    mode: RouteMode::Single,
                    main_response: None,
                    executor_response: None,
                    final_response: ChatResponse::synthesized(&model, ""),
                    tool_calls: Vec::new(),
                    latency: RouteLatency::default(),
                    phases: vec![PhaseOutcome {
                        name: "response",
                        latency_ms: 0,
                        error: Some(e.to_string()),
                    }],
                    intent: None,
                })
            }
        }
    }

    async fn route_dual(&self, request: RouteRequest) -> Result<RouteResult, RouterError> {
        let main_model = self
            .config
            .main_model
            .clone()
            .ok_or_else(|| RouterError::Configuration("missing main model".to_string()))?;
        let executor_model = self
            .config
            .executor_model
            .clone()
            .ok_or_else(|| RouterError::Configuration("missing executor model".to_string()))?;
        let turn_started = Instant::now();

        // Phase 1: planning. Only user/system messages, no tools; the main
        // model's prosthetic rides along in the system prompt.
        let main_prosthetic = self.prosthetics.get(&main_model).await;
        let mut planning_messages = vec![Message::system(planner_system_prompt(
            main_prosthetic.as_ref(),
        ))];
        planning_messages.extend(
            request
                .messages
                .iter()
                .filter(|m| matches!(m.role, Role::System | Role::User))
                .cloned(),
        );
        let planning_opts = CallOptions {
            timeout: self.call_timeout(request.deadline),
            temperature: self.config.temperature,
            ..CallOptions::default()
        };
        let planning = self
            .backend
            .chat(&main_model, &planning_messages, None, &planning_opts)
            .await;

        let (main_response, planning_phase) = match planning {
            Ok(response) => {
                let phase = PhaseOutcome {
                    name: "planning",
                    latency_ms: response.latency_ms,
                    error: None,
                };
                (response, phase)
            }
            Err(e) => {
                let category = match &e {
                    crate::provider::ProviderError::Timeout { .. } => FailureCategory::Intent,
                    _ => FailureCategory::Unknown,
                };
                self.log_failure(&request, category, format!("main timeout or failure: {e}"))
                    .await;
                return Ok(RouteResult {
                    mode: RouteMode::Dual,
                    main_response: None,
                    executor_response: None,
                    final_response: ChatResponse::synthesized(&request.model, ""),
                    tool_calls: Vec::new(),
                    latency: RouteLatency {
                        total_ms: turn_started.elapsed().as_millis() as u64,
                        ..RouteLatency::default()
                    },
                    phases: vec![PhaseOutcome {
                        name: "planning",
                        latency_ms: 0,
                        error: Some(e.to_string()),
                    }],
                    intent: None,
                });
            }
        };
        let main_ms = main_response.latency_ms;

        // Phase 2: exactly one intent parse per turn.
        let intent = parse_intent(&main_response.content());
        debug!(action = ?intent.action, tool = ?intent.tool, "intent parsed");

        // A spent deadline during planning skips execution entirely.
        if Self::deadline_spent(request.deadline) {
            let content = intent.metadata.response.clone().unwrap_or_default();
            return Ok(RouteResult {
                mode: RouteMode::Dual,
                main_response: Some(main_response),
                executor_response: None,
                final_response: ChatResponse::synthesized(&request.model, &content),
                tool_calls: Vec::new(),
                latency: RouteLatency {
                    main_ms,
                    executor_ms: 0,
                    total_ms: turn_started.elapsed().as_millis() as u64,
                },
                phases: vec![planning_phase],
                intent: Some(intent),
            });
        }

        // Phase 3: early return for respond / ask_clarification.
        if matches!(
            intent.action,
            IntentAction::Respond | IntentAction::AskClarification
        ) {
            return self
                .finish_without_executor(
                    request,
                    &main_model,
                    main_response,
                    planning_phase,
                    intent,
                    turn_started,
                )
                .await;
        }

        // Phase 4: execution. Tools are the intersection of the request's
        // tools and the executor profile's enabled list; an empty profile
        // list means the request tools pass through unchanged.
        let executor_prosthetic = self.prosthetics.get(&executor_model).await;
        let tools = self
            .executor_tools(&executor_model, &request.tools)
            .await;
        let executor_messages = vec![
            Message::system(executor_system_prompt(
                executor_prosthetic.as_ref(),
                request.executor_addendum.as_deref(),
            )),
            Message::user(intent.serialized()).with_source("planner"),
        ];
        let executor_opts = CallOptions {
            timeout: self.call_timeout(request.deadline),
            tool_choice: ToolChoiceMode::Auto,
            temperature: self.config.temperature,
            ..CallOptions::default()
        };
        let exposed = if tools.is_empty() { None } else { Some(tools.as_slice()) };
        let execution = self
            .backend
            .chat(&executor_model, &executor_messages, exposed, &executor_opts)
            .await;

        match execution {
            Ok(executor_response) => {
                let tool_calls = executor_response.tool_calls();
                if intent.action == IntentAction::CallTool && tool_calls.is_empty() {
                    self.log_failure(
                        &request,
                        FailureCategory::Tool,
                        "tool not called for call_tool intent".to_string(),
                    )
                    .await;
                }
                let executor_ms = executor_response.latency_ms;
                info!(
                    main = %main_model,
                    executor = %executor_model,
                    calls = tool_calls.len(),
                    "dual turn complete"
                );
                Ok(RouteResult {
                    mode: RouteMode::Dual,
                    main_response: Some(main_response),
                    executor_response: Some(executor_response.clone()),
                    final_response: executor_response,
                    tool_calls,
                    latency: RouteLatency {
                        main_ms,
                        executor_ms,
                        total_ms: turn_started.elapsed().as_millis() as u64,
                    },
                    phases: vec![
                        planning_phase,
                        PhaseOutcome {
                            name: "execution",
                            latency_ms: executor_ms,
                            error: None,
                        },
                    ],
                    intent: Some(intent),
                })
            }
            Err(e) => {
                self.log_failure(&request, FailureCategory::Tool, e.failure_text())
                    .await;
                Ok(RouteResult {
                    mode: RouteMode::Dual,
                    main_response: Some(main_response),
                    executor_response: None,
                    final_response: ChatResponse::synthesized(&request.model, ""),
                    tool_calls: Vec::new(),
                    latency: RouteLatency {
                        main_ms,
                        executor_ms: 0,
                        total_ms: turn_started.elapsed().as_millis() as u64,
                    },
                    phases: vec![
                        planning_phase,
                        PhaseOutcome {
                            name: "execution",
                            latency_ms: 0,
                            error: Some(e.to_string()),
                        },
                    ],
                    intent: Some(intent),
                })
            }
        }
    }

    /// Early return path: synthesize the assistant message from the intent,
    /// or make a second neutral no-tools call when it carried no text.
    async fn finish_without_executor(
        &self,
        request: RouteRequest,
        main_model: &str,
        main_response: ChatResponse,
        planning_phase: PhaseOutcome,
        intent: Intent,
        turn_started: Instant,
    ) -> Result<RouteResult, RouterError> {
        let direct = match intent.action {
            IntentAction::AskClarification => intent.metadata.question.clone(),
            _ => intent.metadata.response.clone(),
        };
        let mut phases = vec![planning_phase];
        let main_ms = main_response.latency_ms;

        let content = match direct {
            Some(text) if !text.is_empty() => text,
            _ => {
                let mut messages = vec![Message::system(NEUTRAL_RESPONSE_PROMPT)];
                messages.extend(
                    request
                        .messages
                        .iter()
                        .filter(|m| m.role == Role::User)
                        .cloned(),
                );
                let opts = CallOptions {
                    timeout: self.call_timeout(request.deadline),
                    temperature: self.config.temperature,
                    ..CallOptions::default()
                };
                match self.backend.chat(main_model, &messages, None, &opts).await {
                    Ok(second) => {
                        phases.push(PhaseOutcome {
                            name: "response",
                            latency_ms: second.latency_ms,
                            error: None,
                        });
                        second.content()
                    }
                    Err(e) => {
                        phases.push(PhaseOutcome {
                            name: "response",
                            latency_ms: 0,
                            error: Some(e.to_string()),
                        });
                        String::new()
                    }
                }
            }
        };

        Ok(RouteResult {
            mode: RouteMode::Dual,
            main_response: Some(main_response),
            executor_response: None,
            final_response: ChatResponse::synthesized(&request.model, &content),
            tool_calls: Vec::new(),
            latency: RouteLatency {
                main_ms,
                executor_ms: 0,
                total_ms: turn_started.elapsed().as_millis() as u64,
            },
            phases,
            intent: Some(intent),
        })
    }

    /// Request tools ∩ profile-enabled tools; request tools unchanged when
    /// the profile has no list.
    async fn executor_tools(&self, executor_model: &str, requested: &[ToolSpec]) -> Vec<ToolSpec> {
        match self.registry.get(executor_model).await {
            Some(profile) if !profile.enabled_tools.is_empty() => requested
                .iter()
                .filter(|t| profile.enabled_tools.iter().any(|e| e == &t.name))
                .cloned()
                .collect(),
            _ => requested.to_vec(),
        }
    }
}

/// Picks the best main and executor from the registry for a provider: main
/// by suppression + selection, executor by emit + schema adherence.
pub async fn auto_select(registry: &CapabilityRegistry) -> (Option<String>, Option<String>) {
    let profiles = registry.all().await;
    let score_sum = |p: &crate::registry::ModelProfile, names: [&str; 2]| -> u32 {
        names.iter().filter_map(|n| p.probe_score(n)).sum()
    };
    let main = profiles
        .iter()
        .filter(|p| matches!(p.role, ModelRole::Main | ModelRole::Both))
        .max_by_key(|p| score_sum(p, ["tool_suppression", "tool_selection"]))
        .map(|p| p.model_id.clone());
    let executor = profiles
        .iter()
        .filter(|p| matches!(p.role, ModelRole::Executor | ModelRole::Both))
        .max_by_key(|p| score_sum(p, ["tool_emit", "tool_schema_adherence"]))
        .map(|p| p.model_id.clone());
    (main, executor)
}
