//! The failure-pattern catalog and (category, error type) → pattern lookup.

use serde::{Deserialize, Serialize};

/// Failure category of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Tool,
    Rag,
    Reasoning,
    Intent,
    Browser,
    ComboPairing,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Tool => "tool",
            FailureCategory::Rag => "rag",
            FailureCategory::Reasoning => "reasoning",
            FailureCategory::Intent => "intent",
            FailureCategory::Browser => "browser",
            FailureCategory::ComboPairing => "combo_pairing",
            FailureCategory::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Static definition of a known pattern.
pub struct PatternDef {
    pub id: &'static str,
    pub name: &'static str,
    pub severity: Severity,
    pub category: FailureCategory,
    /// Exact error type, or `None` to match the whole category.
    pub error_type: Option<&'static str>,
}

/// The pattern catalog. Order matters only for the category-wide fallbacks,
/// which are listed after the exact entries.
pub const PATTERNS: &[PatternDef] = &[
    PatternDef {
        id: "RAG_NOT_USED_BEFORE_READ",
        name: "Index not consulted before file access",
        severity: Severity::Medium,
        category: FailureCategory::Rag,
        error_type: Some("rag_not_used"),
    },
    PatternDef {
        id: "TOOL_SUPPRESSION",
        name: "Required tool call not emitted",
        severity: Severity::High,
        category: FailureCategory::Tool,
        error_type: Some("tool_not_called"),
    },
    PatternDef {
        id: "WRONG_TOOL_SELECTION",
        name: "Wrong tool picked for the request",
        severity: Severity::Medium,
        category: FailureCategory::Tool,
        error_type: Some("wrong_tool"),
    },
    PatternDef {
        id: "PARAM_EXTRACTION_FAILURE",
        name: "Tool parameters wrong or missing",
        severity: Severity::Medium,
        category: FailureCategory::Tool,
        error_type: Some("bad_params"),
    },
    PatternDef {
        id: "INTENT_MISUNDERSTANDING",
        name: "Planner misread the user intent",
        severity: Severity::Medium,
        category: FailureCategory::Intent,
        error_type: Some("intent_misread"),
    },
    PatternDef {
        id: "TOOL_HALLUCINATION",
        name: "Call to a tool that does not exist",
        severity: Severity::Critical,
        category: FailureCategory::Tool,
        error_type: Some("hallucination"),
    },
    PatternDef {
        id: "COMBO_MAIN_TIMEOUT",
        name: "Main model timing out during planning",
        severity: Severity::High,
        category: FailureCategory::ComboPairing,
        error_type: Some("main_timeout"),
    },
    PatternDef {
        id: "COMBO_COORDINATION_BREAKDOWN",
        name: "Planner and executor out of step",
        severity: Severity::Medium,
        category: FailureCategory::ComboPairing,
        error_type: Some("poor_coordination"),
    },
    PatternDef {
        id: "COMBO_SCORE_TOO_LOW",
        name: "Pair scoring below the usable floor",
        severity: Severity::Medium,
        category: FailureCategory::ComboPairing,
        error_type: Some("score_too_low"),
    },
    PatternDef {
        id: "COMBO_MAIN_EXCLUDED",
        name: "Main model excluded mid-run",
        severity: Severity::High,
        category: FailureCategory::ComboPairing,
        error_type: Some("combo_excluded"),
    },
    PatternDef {
        id: "COMBO_QUALIFYING_GATE",
        name: "Pair failed the qualifying gate",
        severity: Severity::Medium,
        category: FailureCategory::ComboPairing,
        error_type: Some("qualifying_gate_failure"),
    },
    PatternDef {
        id: "COMBO_FORMAT_MISMATCH",
        name: "Pair disagrees on tool-call format",
        severity: Severity::Medium,
        category: FailureCategory::ComboPairing,
        error_type: Some("format_compatibility"),
    },
    // Category-wide fallback: any reasoning failure clusters here.
    PatternDef {
        id: "REASONING_FAILURE",
        name: "Reasoning breakdown",
        severity: Severity::High,
        category: FailureCategory::Reasoning,
        error_type: None,
    },
];

/// Finds the pattern for a (category, error type) pair: exact match first,
/// then a category-wide fallback.
pub fn detect(category: FailureCategory, error_type: &str) -> Option<&'static PatternDef> {
    PATTERNS
        .iter()
        .find(|p| p.category == category && p.error_type == Some(error_type))
        .or_else(|| {
            PATTERNS
                .iter()
                .find(|p| p.category == category && p.error_type.is_none())
        })
}

pub fn pattern_def(id: &str) -> Option<&'static PatternDef> {
    PATTERNS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_called_maps_to_suppression_pattern() {
        let def = detect(FailureCategory::Tool, "tool_not_called").unwrap();
        assert_eq!(def.id, "TOOL_SUPPRESSION");
        assert_eq!(def.severity, Severity::High);
    }

    #[test]
    fn reasoning_category_falls_back_to_reasoning_failure() {
        let def = detect(FailureCategory::Reasoning, "timeout").unwrap();
        assert_eq!(def.id, "REASONING_FAILURE");
    }

    #[test]
    fn unknown_pairs_have_no_pattern() {
        assert!(detect(FailureCategory::Unknown, "timeout").is_none());
        assert!(detect(FailureCategory::Tool, "unheard_of").is_none());
    }

    #[test]
    fn combo_patterns_cover_all_six_error_types() {
        for error_type in [
            "main_timeout",
            "poor_coordination",
            "score_too_low",
            "combo_excluded",
            "qualifying_gate_failure",
            "format_compatibility",
        ] {
            assert!(
                detect(FailureCategory::ComboPairing, error_type).is_some(),
                "no combo pattern for {error_type}"
            );
        }
    }

    #[test]
    fn pattern_ids_unique() {
        let mut ids: Vec<_> = PATTERNS.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), PATTERNS.len());
    }
}
