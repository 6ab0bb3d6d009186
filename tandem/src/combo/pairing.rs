//! Pairing recommender: picks the best main+executor pair from profiles
//! under optional VRAM constraints.

use std::collections::HashMap;

use serde::Serialize;

use crate::probe::SpeedRating;
use crate::registry::ModelProfile;
use crate::score::ModelRole;

/// Resource constraints for pairing.
#[derive(Clone, Debug, Default)]
pub struct PairingConstraints {
    /// Combined VRAM budget, when known.
    pub vram_limit_mb: Option<u32>,
    /// Per-model VRAM estimates; models absent here are unconstrained.
    pub vram_by_model: HashMap<String, u32>,
}

/// The recommended pair with its scoring trail.
#[derive(Clone, Debug, Serialize)]
pub struct PairingRecommendation {
    pub main_model_id: String,
    pub executor_model_id: String,
    /// Mean of main suitability, executor suitability, and compatibility.
    pub overall: u32,
    pub main_suitability: f64,
    pub executor_suitability: f64,
    pub compatibility: f64,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
}

fn speed_bonus(rating: Option<SpeedRating>) -> f64 {
    match rating {
        Some(SpeedRating::Excellent) => 100.0,
        Some(SpeedRating::Good) => 80.0,
        Some(SpeedRating::Acceptable) => 60.0,
        Some(SpeedRating::Slow) => 30.0,
        Some(SpeedRating::VerySlow) => 10.0,
        None => 60.0,
    }
}

fn main_suitability(p: &ModelProfile) -> f64 {
    0.30 * p.scores.reasoning
        + 0.25 * p.scores.rag_usage
        + 0.20 * p.scores.intent_recognition
        + 0.15 * p.scores.trainability
        + 0.10 * p.scores.self_correction
}

fn executor_suitability(p: &ModelProfile) -> f64 {
    0.50 * p.scores.tool_accuracy
        + 0.20 * (100.0 - p.scores.anti_pattern_penalty)
        + 0.15 * p.scores.intent_recognition
        + 0.15 * speed_bonus(p.speed_rating())
}

/// The family prefix of a model id: everything before the first digit or
/// separator ("qwen2.5-7b" → "qwen", "org/model" → "org").
pub fn model_family(model_id: &str) -> String {
    model_id
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase()
}

struct Compatibility {
    score: f64,
    reasons: Vec<String>,
    warnings: Vec<String>,
}

fn compatibility(main: &ModelProfile, executor: &ModelProfile) -> Compatibility {
    let mut score = 50.0;
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    if main.scores.reasoning >= 70.0 && executor.scores.tool_accuracy >= 80.0 {
        score += 30.0;
        reasons.push("strong complement: planner reasons well, executor calls tools well".to_string());
    }
    if main.scores.trainability >= 80.0 {
        score += 20.0;
        reasons.push("main responds well to corrective prompts".to_string());
    }
    match executor.speed_rating() {
        Some(SpeedRating::Excellent) | Some(SpeedRating::Good) => {
            score += 15.0;
            reasons.push("executor latency suits interactive use".to_string());
        }
        Some(SpeedRating::Slow) | Some(SpeedRating::VerySlow) => {
            score -= 10.0;
            warnings.push("executor is slow; turns will drag".to_string());
        }
        _ => {}
    }
    if model_family(&main.model_id) != model_family(&executor.model_id) {
        score += 10.0;
        reasons.push("different model families reduce shared blind spots".to_string());
    } else {
        warnings.push("same model family; failure modes may correlate".to_string());
    }
    if executor.scores.anti_pattern_penalty > 30.0 {
        score -= (executor.scores.anti_pattern_penalty - 30.0) / 2.0;
        warnings.push("executor shows anti-pattern behavior under probing".to_string());
    }

    Compatibility {
        score: score.clamp(0.0, 100.0),
        reasons,
        warnings,
    }
}

fn within_vram(
    constraints: &PairingConstraints,
    main: &str,
    executor: &str,
) -> (bool, Option<String>) {
    let Some(limit) = constraints.vram_limit_mb else {
        return (true, None);
    };
    match (
        constraints.vram_by_model.get(main),
        constraints.vram_by_model.get(executor),
    ) {
        (Some(m), Some(e)) => (m + e <= limit, None),
        _ => (
            true,
            Some("VRAM unknown for one side of the pair; budget unverified".to_string()),
        ),
    }
}

/// Evaluates every eligible (main, executor) combination and returns the
/// best pairing, or `None` when no pair is eligible.
pub fn recommend_pairing(
    profiles: &[ModelProfile],
    constraints: &PairingConstraints,
) -> Option<PairingRecommendation> {
    let mains: Vec<&ModelProfile> = profiles
        .iter()
        .filter(|p| matches!(p.role, ModelRole::Main | ModelRole::Both))
        .collect();
    let executors: Vec<&ModelProfile> = profiles
        .iter()
        .filter(|p| matches!(p.role, ModelRole::Executor | ModelRole::Both))
        .collect();

    let mut best: Option<PairingRecommendation> = None;
    for main in &mains {
        for executor in &executors {
            if main.model_id == executor.model_id {
                continue;
            }
            let (fits, vram_warning) =
                within_vram(constraints, &main.model_id, &executor.model_id);
            if !fits {
                continue;
            }
            let main_suit = main_suitability(main);
            let executor_suit = executor_suitability(executor);
            let compat = compatibility(main, executor);
            let overall = ((main_suit + executor_suit + compat.score) / 3.0).round() as u32;

            let mut warnings = compat.warnings;
            if let Some(w) = vram_warning {
                warnings.push(w);
            }
            let candidate = PairingRecommendation {
                main_model_id: main.model_id.clone(),
                executor_model_id: executor.model_id.clone(),
                overall,
                main_suitability: main_suit,
                executor_suitability: executor_suit,
                compatibility: compat.score,
                reasons: compat.reasons,
                warnings,
            };
            if best.as_ref().is_none_or(|b| candidate.overall > b.overall) {
                best = Some(candidate);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OptimalSettings;
    use crate::score::RawScores;
    use chrono::Utc;

    fn profile(model_id: &str, role: ModelRole, scores: RawScores) -> ModelProfile {
        ModelProfile {
            model_id: model_id.to_string(),
            provider: "local".to_string(),
            test_version: 3,
            tested_at: Utc::now(),
            scores,
            overall: 80,
            role,
            optimal_pairings: Vec::new(),
            settings: OptimalSettings::default(),
            enabled_tools: Vec::new(),
            probes: Vec::new(),
            latency: None,
        }
    }

    fn strong_main(id: &str) -> ModelProfile {
        profile(
            id,
            ModelRole::Main,
            RawScores {
                reasoning: 90.0,
                rag_usage: 80.0,
                intent_recognition: 85.0,
                trainability: 85.0,
                self_correction: 70.0,
                ..RawScores::default()
            },
        )
    }

    fn strong_executor(id: &str) -> ModelProfile {
        profile(
            id,
            ModelRole::Executor,
            RawScores {
                tool_accuracy: 92.0,
                intent_recognition: 60.0,
                anti_pattern_penalty: 5.0,
                ..RawScores::default()
            },
        )
    }

    #[test]
    fn complementary_pair_is_recommended_with_reasons() {
        let profiles = vec![strong_main("qwen-32b"), strong_executor("mistral-7b")];
        let rec = recommend_pairing(&profiles, &PairingConstraints::default()).unwrap();
        assert_eq!(rec.main_model_id, "qwen-32b");
        assert_eq!(rec.executor_model_id, "mistral-7b");
        assert!(rec.overall > 60);
        assert!(rec.reasons.iter().any(|r| r.contains("complement")));
        assert!(rec.reasons.iter().any(|r| r.contains("families")));
    }

    #[test]
    fn vram_limit_excludes_oversized_pairs() {
        let profiles = vec![
            strong_main("big-main"),
            strong_executor("big-exec"),
            strong_executor("small-exec"),
        ];
        let mut constraints = PairingConstraints {
            vram_limit_mb: Some(24_000),
            vram_by_model: HashMap::new(),
        };
        constraints.vram_by_model.insert("big-main".to_string(), 20_000);
        constraints.vram_by_model.insert("big-exec".to_string(), 16_000);
        constraints.vram_by_model.insert("small-exec".to_string(), 4_000);

        let rec = recommend_pairing(&profiles, &constraints).unwrap();
        assert_eq!(rec.executor_model_id, "small-exec");
    }

    #[test]
    fn same_family_warns() {
        let profiles = vec![strong_main("qwen-32b"), strong_executor("qwen-7b")];
        let rec = recommend_pairing(&profiles, &PairingConstraints::default()).unwrap();
        assert!(rec.warnings.iter().any(|w| w.contains("family")));
    }

    #[test]
    fn no_eligible_roles_yields_none() {
        let profiles = vec![profile("m", ModelRole::None, RawScores::default())];
        assert!(recommend_pairing(&profiles, &PairingConstraints::default()).is_none());
    }

    #[test]
    fn model_family_strips_versions_and_sizes() {
        assert_eq!(model_family("qwen2.5-7b-instruct"), "qwen");
        assert_eq!(model_family("mistral-7b"), "mistral");
        assert_eq!(model_family("org/model"), "org");
    }
}
