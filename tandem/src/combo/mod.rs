//! Combo evaluator: scores main×executor pairs through the dual-mode
//! pipeline.
//!
//! Each pair runs a tiered test set (simple → medium → complex). The
//! qualifying gate is honored fully: a pair scoring below the gate on the
//! simple tier is disqualified before the expensive tiers run. A main model
//! whose planning step keeps failing is excluded mid-run, and remaining
//! pairs with it are skipped. Per-model calls are strictly sequential.

mod pairing;
mod store;
mod tests_catalog;

pub use pairing::{model_family, recommend_pairing, PairingConstraints, PairingRecommendation};
pub use store::ComboStore;
pub use tests_catalog::{ComboTest, ComboTier, COMBO_TESTS};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::failure::{FailureCategory, FailureLog, LogFailureParams};
use crate::message::Message;
use crate::persist::StoreError;
use crate::prosthetic::ProstheticStore;
use crate::provider::ChatBackend;
use crate::registry::CapabilityRegistry;
use crate::router::{IntentAction, IntentRouter, RouteRequest, RouterConfig};

/// Simple-tier score a pair must reach before the expensive tiers run.
pub const QUALIFYING_GATE: u32 = 50;

/// Planning failures (unparseable intent or planner error) that exclude a
/// main model for the rest of the run.
const EXCLUSION_LIMIT: u32 = 3;

/// One test's outcome inside a combo record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComboTestOutcome {
    pub name: String,
    pub tier: ComboTier,
    pub category: String,
    pub pass: bool,
    pub score: u32,
    pub latency_ms: u64,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TierScores {
    pub simple: u32,
    pub medium: u32,
    pub complex: u32,
}

/// Scored record for one (main, executor) pair. Unique per pair; re-runs
/// replace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComboRecord {
    pub main_model_id: String,
    pub executor_model_id: String,
    pub overall_score: u32,
    pub tier_scores: TierScores,
    #[serde(default)]
    pub category_scores: HashMap<String, u32>,
    pub tests: Vec<ComboTestOutcome>,
    pub avg_latency_ms: u64,
    pub passed: u32,
    pub failed: u32,
    /// Main model was excluded mid-run; scores cover completed tests only.
    #[serde(default)]
    pub excluded: bool,
    /// Pair failed the qualifying gate; medium/complex never ran.
    #[serde(default)]
    pub gate_failed: bool,
    pub timestamp: DateTime<Utc>,
}

impl ComboRecord {
    pub fn pair_key(main: &str, executor: &str) -> String {
        format!("{main}|{executor}")
    }
}

/// Progress events for the dashboard fan-out.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComboProgress {
    Progress {
        main_model_id: String,
        executor_model_id: String,
        completed: usize,
        total: usize,
    },
    Result(Box<ComboRecord>),
    MainExcluded {
        main_model_id: String,
    },
    Error {
        main_model_id: String,
        executor_model_id: String,
        error: String,
    },
    Completed {
        records: usize,
    },
}

/// Runs scored combo tests across candidate pairs.
pub struct ComboEvaluator {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<CapabilityRegistry>,
    prosthetics: Arc<ProstheticStore>,
    failure_log: Arc<FailureLog>,
    store: Arc<ComboStore>,
    timeout: Duration,
}

impl ComboEvaluator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        registry: Arc<CapabilityRegistry>,
        prosthetics: Arc<ProstheticStore>,
        failure_log: Arc<FailureLog>,
        store: Arc<ComboStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            registry,
            prosthetics,
            failure_log,
            store,
            timeout,
        }
    }

    fn router_for(&self, main: &str, executor: &str) -> IntentRouter {
        IntentRouter::new(
            self.backend.clone(),
            self.registry.clone(),
            self.prosthetics.clone(),
            self.failure_log.clone(),
            RouterConfig {
                main_model: Some(main.to_string()),
                executor_model: Some(executor.to_string()),
                enable_dual: true,
                timeout: self.timeout,
                temperature: Some(0.0),
            },
        )
    }

    async fn emit(progress: &Option<mpsc::Sender<ComboProgress>>, event: ComboProgress) {
        if let Some(tx) = progress {
            let _ = tx.send(event).await;
        }
    }

    /// Runs one test through the pair's dual pipeline and scores the result.
    /// The second return marks a planning failure (for exclusion counting).
    async fn run_test(
        &self,
        router: &IntentRouter,
        test: &ComboTest,
    ) -> (ComboTestOutcome, bool) {
        let mut request = RouteRequest::new("combo-test", vec![Message::user(test.user_message)]);
        request.tools = (test.tools)();
        let outcome = router.route(request).await;

        let result = match outcome {
            Ok(r) => r,
            Err(e) => {
                return (
                    ComboTestOutcome {
                        name: test.name.to_string(),
                        tier: test.tier,
                        category: test.category.to_string(),
                        pass: false,
                        score: 0,
                        latency_ms: 0,
                        detail: e.to_string(),
                    },
                    true,
                )
            }
        };

        let planning_failed = result
            .phases
            .iter()
            .any(|p| p.name == "planning" && p.error.is_some())
            || result.intent.as_ref().is_some_and(|i| {
                i.action == IntentAction::Respond
                    && i.metadata.reasoning.as_deref() == Some("could not parse")
            });

        let evaluation = (test.evaluate)(&result);
        let latency_ms = result.latency.total_ms;
        (
            ComboTestOutcome {
                name: test.name.to_string(),
                tier: test.tier,
                category: test.category.to_string(),
                pass: evaluation.pass,
                score: evaluation.score,
                latency_ms,
                detail: evaluation.details,
            },
            planning_failed,
        )
    }

    async fn log_combo_failure(&self, main: &str, executor: &str, error: &str) {
        let params = LogFailureParams {
            model_id: main.to_string(),
            executor_model_id: Some(executor.to_string()),
            category: FailureCategory::ComboPairing,
            error: error.to_string(),
            query: String::new(),
            conversation_depth: 0,
        };
        if let Err(e) = self.failure_log.log_failure(params).await {
            warn!(error = %e, "combo failure-log write failed");
        }
    }

    /// Evaluates one pair: simple tier, gate check, then the rest.
    async fn evaluate_pair(
        &self,
        main: &str,
        executor: &str,
        planning_failures: &mut u32,
        cancel: &CancellationToken,
    ) -> ComboRecord {
        let router = self.router_for(main, executor);
        let mut tests: Vec<ComboTestOutcome> = Vec::new();
        let mut gate_failed = false;
        let mut excluded = false;

        for tier in [ComboTier::Simple, ComboTier::Medium, ComboTier::Complex] {
            if gate_failed || excluded || cancel.is_cancelled() {
                break;
            }
            for test in COMBO_TESTS.iter().filter(|t| t.tier == tier) {
                if cancel.is_cancelled() {
                    break;
                }
                let (outcome, planning_failed) = self.run_test(&router, test).await;
                if planning_failed {
                    *planning_failures += 1;
                    if *planning_failures >= EXCLUSION_LIMIT {
                        excluded = true;
                    }
                }
                tests.push(outcome);
                if excluded {
                    break;
                }
            }
            if tier == ComboTier::Simple && !excluded {
                let simple = tier_score(&tests, ComboTier::Simple);
                if simple < QUALIFYING_GATE {
                    gate_failed = true;
                    self.log_combo_failure(
                        main,
                        executor,
                        &format!("qualifying gate: simple tier scored {simple}"),
                    )
                    .await;
                }
            }
        }

        build_record(main, executor, tests, excluded, gate_failed)
    }

    /// Runs all pairs. Pairs with an excluded main are skipped; every record
    /// is persisted as it completes.
    pub async fn run(
        &self,
        mains: &[String],
        executors: &[String],
        progress: Option<mpsc::Sender<ComboProgress>>,
        cancel: CancellationToken,
    ) -> Result<Vec<ComboRecord>, StoreError> {
        let total = mains.len() * executors.len();
        let mut records = Vec::new();
        let mut completed = 0usize;
        let mut excluded_mains: Vec<String> = Vec::new();

        info!(mains = mains.len(), executors = executors.len(), "combo run starting");
        'mains: for main in mains {
            let mut planning_failures = 0u32;
            for executor in executors {
                if cancel.is_cancelled() {
                    break 'mains;
                }
                if excluded_mains.contains(main) {
                    completed += 1;
                    continue;
                }
                Self::emit(
                    &progress,
                    ComboProgress::Progress {
                        main_model_id: main.clone(),
                        executor_model_id: executor.clone(),
                        completed,
                        total,
                    },
                )
                .await;

                let record = self
                    .evaluate_pair(main, executor, &mut planning_failures, &cancel)
                    .await;
                completed += 1;

                if record.excluded {
                    excluded_mains.push(main.clone());
                    self.log_combo_failure(main, executor, "main model excluded after repeated planning failures")
                        .await;
                    Self::emit(
                        &progress,
                        ComboProgress::MainExcluded {
                            main_model_id: main.clone(),
                        },
                    )
                    .await;
                }

                self.store.upsert(record.clone()).await?;
                Self::emit(&progress, ComboProgress::Result(Box::new(record.clone()))).await;
                records.push(record);
            }
        }

        // Partner lists feed the registry's optimal pairings.
        for main in mains {
            let mut partners: Vec<(String, u32)> = records
                .iter()
                .filter(|r| &r.main_model_id == main && !r.excluded && !r.gate_failed)
                .map(|r| (r.executor_model_id.clone(), r.overall_score))
                .collect();
            partners.sort_by(|a, b| b.1.cmp(&a.1));
            let pairings: Vec<String> = partners.into_iter().map(|(id, _)| id).collect();
            if !pairings.is_empty() {
                self.registry.set_pairings(main, pairings).await?;
            }
        }

        Self::emit(
            &progress,
            ComboProgress::Completed {
                records: records.len(),
            },
        )
        .await;
        info!(records = records.len(), "combo run complete");
        Ok(records)
    }
}

fn tier_score(tests: &[ComboTestOutcome], tier: ComboTier) -> u32 {
    let scores: Vec<u32> = tests
        .iter()
        .filter(|t| t.tier == tier)
        .map(|t| t.score)
        .collect();
    if scores.is_empty() {
        0
    } else {
        (scores.iter().sum::<u32>() as f64 / scores.len() as f64).round() as u32
    }
}

fn build_record(
    main: &str,
    executor: &str,
    tests: Vec<ComboTestOutcome>,
    excluded: bool,
    gate_failed: bool,
) -> ComboRecord {
    let tier_scores = TierScores {
        simple: tier_score(&tests, ComboTier::Simple),
        medium: tier_score(&tests, ComboTier::Medium),
        complex: tier_score(&tests, ComboTier::Complex),
    };
    let mut by_category: HashMap<String, Vec<u32>> = HashMap::new();
    for t in &tests {
        by_category.entry(t.category.clone()).or_default().push(t.score);
    }
    let category_scores = by_category
        .into_iter()
        .map(|(category, scores)| {
            let mean = (scores.iter().sum::<u32>() as f64 / scores.len() as f64).round() as u32;
            (category, mean)
        })
        .collect();
    let passed = tests.iter().filter(|t| t.pass).count() as u32;
    let failed = tests.len() as u32 - passed;
    let avg_latency_ms = if tests.is_empty() {
        0
    } else {
        tests.iter().map(|t| t.latency_ms).sum::<u64>() / tests.len() as u64
    };
    let overall_score = if gate_failed || excluded {
        tier_scores.simple.min(QUALIFYING_GATE.saturating_sub(1))
    } else {
        ((tier_scores.simple + tier_scores.medium + tier_scores.complex) as f64 / 3.0).round()
            as u32
    };
    ComboRecord {
        main_model_id: main.to_string(),
        executor_model_id: executor.to_string(),
        overall_score,
        tier_scores,
        category_scores,
        tests,
        avg_latency_ms,
        passed,
        failed,
        excluded,
        gate_failed,
        timestamp: Utc::now(),
    }
}
