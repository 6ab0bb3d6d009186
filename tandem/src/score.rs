//! Capability scoring: probe results → weighted profile, role recommendation.
//!
//! Every axis is the mean of its constituent probes; probes that did not run
//! drop out of the mean instead of scoring zero. The agentic overall is a
//! weighted sum minus the anti-pattern penalty, clamped to [0, 100].

use serde::{Deserialize, Serialize};

use crate::probe::{Axis, ProbeResult};

/// Weight of each axis in the agentic overall.
pub const WEIGHT_TOOL_ACCURACY: f64 = 0.20;
pub const WEIGHT_INTENT_RECOGNITION: f64 = 0.18;
pub const WEIGHT_RAG_USAGE: f64 = 0.14;
pub const WEIGHT_REASONING: f64 = 0.14;
pub const WEIGHT_BUG_DETECTION: f64 = 0.10;
pub const WEIGHT_CODE_UNDERSTANDING: f64 = 0.10;
pub const WEIGHT_SELF_CORRECTION: f64 = 0.06;
pub const WEIGHT_ANTI_PATTERN_PENALTY: f64 = 0.08;

/// Raw per-axis scores, 0–100 each.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScores {
    pub tool_accuracy: f64,
    pub intent_recognition: f64,
    pub rag_usage: f64,
    pub reasoning: f64,
    pub bug_detection: f64,
    pub code_understanding: f64,
    pub self_correction: f64,
    /// Accumulated anti-pattern signal (0 = clean), subtracted from overall.
    pub anti_pattern_penalty: f64,
    /// How much a level-1 prosthetic improves behavior; not part of the
    /// overall, consumed by the pairing recommender.
    pub trainability: f64,
}

/// Recommended deployment role for a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Main,
    Executor,
    Both,
    None,
}

/// Weighted summary of a profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub overall: u32,
    pub role: ModelRole,
    pub scores: RawScores,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl RawScores {
    /// Aggregates probe results into axes. A probe contributes its score to
    /// the axis its descriptor names; absent axes stay at their default.
    pub fn from_probes(results: &[ProbeResult]) -> Self {
        let mut by_axis: [Vec<f64>; 9] = Default::default();
        for r in results {
            by_axis[r.axis as usize].push(f64::from(r.score));
        }
        let axis = |a: Axis| mean(&by_axis[a as usize]).unwrap_or(0.0);
        Self {
            tool_accuracy: axis(Axis::ToolAccuracy),
            intent_recognition: axis(Axis::IntentRecognition),
            rag_usage: axis(Axis::RagUsage),
            reasoning: axis(Axis::Reasoning),
            bug_detection: axis(Axis::BugDetection),
            code_understanding: axis(Axis::CodeUnderstanding),
            self_correction: axis(Axis::SelfCorrection),
            anti_pattern_penalty: mean(&by_axis[Axis::AntiPattern as usize]).unwrap_or(0.0),
            trainability: axis(Axis::Trainability),
        }
    }

    /// Weighted agentic overall, clamped to [0, 100] and rounded.
    ///
    /// Axes without any probe drop out: the weighted sum is renormalized over
    /// the weights of the axes that actually ran.
    pub fn overall(&self, ran: &AxisPresence) -> u32 {
        let mut sum = 0.0;
        let mut weight_total = 0.0;
        let mut add = |present: bool, score: f64, weight: f64| {
            if present {
                sum += score * weight;
                weight_total += weight;
            }
        };
        add(ran.tool_accuracy, self.tool_accuracy, WEIGHT_TOOL_ACCURACY);
        add(
            ran.intent_recognition,
            self.intent_recognition,
            WEIGHT_INTENT_RECOGNITION,
        );
        add(ran.rag_usage, self.rag_usage, WEIGHT_RAG_USAGE);
        add(ran.reasoning, self.reasoning, WEIGHT_REASONING);
        add(ran.bug_detection, self.bug_detection, WEIGHT_BUG_DETECTION);
        add(
            ran.code_understanding,
            self.code_understanding,
            WEIGHT_CODE_UNDERSTANDING,
        );
        add(
            ran.self_correction,
            self.self_correction,
            WEIGHT_SELF_CORRECTION,
        );
        if weight_total == 0.0 {
            return 0;
        }
        let weighted = sum / weight_total;
        let overall = weighted - self.anti_pattern_penalty * WEIGHT_ANTI_PATTERN_PENALTY;
        overall.clamp(0.0, 100.0).round() as u32
    }

    /// Divides each axis by `baseline_overall / 100` and re-clamps, so
    /// comparisons are relative to a known achievable ceiling. Applied only
    /// when the baseline itself scored below 95.
    pub fn normalize_against_baseline(&mut self, baseline_overall: u32) {
        if baseline_overall >= 95 || baseline_overall == 0 {
            return;
        }
        let factor = f64::from(baseline_overall) / 100.0;
        let norm = |v: &mut f64| *v = (*v / factor).clamp(0.0, 100.0);
        norm(&mut self.tool_accuracy);
        norm(&mut self.intent_recognition);
        norm(&mut self.rag_usage);
        norm(&mut self.reasoning);
        norm(&mut self.bug_detection);
        norm(&mut self.code_understanding);
        norm(&mut self.self_correction);
        norm(&mut self.trainability);
    }
}

/// Which axes had at least one probe run.
#[derive(Clone, Copy, Debug, Default)]
pub struct AxisPresence {
    pub tool_accuracy: bool,
    pub intent_recognition: bool,
    pub rag_usage: bool,
    pub reasoning: bool,
    pub bug_detection: bool,
    pub code_understanding: bool,
    pub self_correction: bool,
}

impl AxisPresence {
    pub fn all() -> Self {
        Self {
            tool_accuracy: true,
            intent_recognition: true,
            rag_usage: true,
            reasoning: true,
            bug_detection: true,
            code_understanding: true,
            self_correction: true,
        }
    }

    pub fn from_probes(results: &[ProbeResult]) -> Self {
        let mut p = Self::default();
        for r in results {
            match r.axis {
                Axis::ToolAccuracy => p.tool_accuracy = true,
                Axis::IntentRecognition => p.intent_recognition = true,
                Axis::RagUsage => p.rag_usage = true,
                Axis::Reasoning => p.reasoning = true,
                Axis::BugDetection => p.bug_detection = true,
                Axis::CodeUnderstanding => p.code_understanding = true,
                Axis::SelfCorrection => p.self_correction = true,
                Axis::AntiPattern | Axis::Trainability => {}
            }
        }
        p
    }
}

/// Role recommendation, a pure function of the raw scores.
///
/// main: reasoning ≥ 80 ∧ intent ≥ 60 ∧ rag ≥ 60; executor: tool ≥ 80;
/// both when both hold; none otherwise (and always when overall < 60).
pub fn recommend_role(scores: &RawScores, overall: u32) -> ModelRole {
    let main_fit = scores.reasoning >= 80.0
        && scores.intent_recognition >= 60.0
        && scores.rag_usage >= 60.0;
    let executor_fit = scores.tool_accuracy >= 80.0;
    if overall < 60 {
        return ModelRole::None;
    }
    match (main_fit, executor_fit) {
        (true, true) => ModelRole::Both,
        (true, false) => ModelRole::Main,
        (false, true) => ModelRole::Executor,
        (false, false) => ModelRole::None,
    }
}

/// Builds the full breakdown for a probe run.
pub fn breakdown(results: &[ProbeResult]) -> ScoreBreakdown {
    let scores = RawScores::from_probes(results);
    let overall = scores.overall(&AxisPresence::from_probes(results));
    ScoreBreakdown {
        overall,
        role: recommend_role(&scores, overall),
        scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_scores(v: f64) -> RawScores {
        RawScores {
            tool_accuracy: v,
            intent_recognition: v,
            rag_usage: v,
            reasoning: v,
            bug_detection: v,
            code_understanding: v,
            self_correction: v,
            anti_pattern_penalty: 0.0,
            trainability: v,
        }
    }

    #[test]
    fn overall_of_uniform_scores_is_that_score() {
        let s = full_scores(80.0);
        assert_eq!(s.overall(&AxisPresence::all()), 80);
    }

    #[test]
    fn anti_pattern_penalty_subtracts() {
        let mut s = full_scores(80.0);
        s.anti_pattern_penalty = 50.0;
        assert_eq!(s.overall(&AxisPresence::all()), 76);
    }

    #[test]
    fn overall_clamped_to_bounds() {
        let mut s = full_scores(2.0);
        s.anti_pattern_penalty = 100.0;
        assert_eq!(s.overall(&AxisPresence::all()), 0);
        let s = full_scores(100.0);
        assert_eq!(s.overall(&AxisPresence::all()), 100);
    }

    #[test]
    fn missing_axes_drop_out_of_the_mean() {
        let s = RawScores {
            tool_accuracy: 90.0,
            reasoning: 70.0,
            ..Default::default()
        };
        let ran = AxisPresence {
            tool_accuracy: true,
            reasoning: true,
            ..Default::default()
        };
        // (90*0.20 + 70*0.14) / 0.34 ≈ 81.8
        assert_eq!(s.overall(&ran), 82);
    }

    #[test]
    fn role_recommendation_thresholds() {
        let mut s = full_scores(85.0);
        assert_eq!(recommend_role(&s, 85), ModelRole::Both);

        s.tool_accuracy = 50.0;
        assert_eq!(recommend_role(&s, 80), ModelRole::Main);

        s.reasoning = 50.0;
        s.tool_accuracy = 90.0;
        assert_eq!(recommend_role(&s, 80), ModelRole::Executor);

        let weak = full_scores(40.0);
        assert_eq!(recommend_role(&weak, 40), ModelRole::None);
    }

    #[test]
    fn role_is_none_when_overall_below_sixty_even_if_axes_qualify() {
        let s = RawScores {
            tool_accuracy: 85.0,
            ..Default::default()
        };
        assert_eq!(recommend_role(&s, 59), ModelRole::None);
    }

    #[test]
    fn baseline_normalization_scales_and_clamps() {
        let mut s = full_scores(45.0);
        s.normalize_against_baseline(90);
        assert_eq!(s.tool_accuracy, 50.0);

        let mut capped = full_scores(99.0);
        capped.normalize_against_baseline(80);
        assert_eq!(capped.reasoning, 100.0);

        let mut untouched = full_scores(45.0);
        untouched.normalize_against_baseline(97);
        assert_eq!(untouched.tool_accuracy, 45.0);
    }
}
