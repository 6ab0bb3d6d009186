//! Error-type classification and query fingerprinting.
//!
//! Classification is a lowercase substring match against a fixed, ordered
//! rubric; the first hit wins. Fingerprints normalize the user query
//! (lowercase, numbers → N, quoted literals collapsed) and hash it, so the
//! same failing request clusters under one key regardless of literals.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Ordered rubric: (needle, error type). Specific needles come first so
/// "main timeout" never degrades to plain "timeout".
const RUBRIC: &[(&str, &str)] = &[
    ("qualifying gate", "qualifying_gate_failure"),
    ("format compat", "format_compatibility"),
    ("main timeout", "main_timeout"),
    ("planning timeout", "main_timeout"),
    ("excluded", "combo_excluded"),
    ("score too low", "score_too_low"),
    ("coordination", "poor_coordination"),
    ("timed out", "timeout"),
    ("timeout", "timeout"),
    ("deadline", "timeout"),
    ("tool not called", "tool_not_called"),
    ("no tool call", "tool_not_called"),
    ("did not call", "tool_not_called"),
    ("wrong tool", "wrong_tool"),
    ("nonexistent tool", "hallucination"),
    ("unknown tool", "hallucination"),
    ("hallucinat", "hallucination"),
    ("could not parse", "parse_error"),
    ("parse error", "parse_error"),
    ("malformed json", "parse_error"),
    ("invalid json", "parse_error"),
    ("rag not used", "rag_not_used"),
    ("index not used", "rag_not_used"),
    ("search not used", "rag_not_used"),
    ("bad param", "bad_params"),
    ("invalid param", "bad_params"),
    ("missing param", "bad_params"),
    ("format error", "format_error"),
    ("leaked", "format_error"),
    ("control token", "format_error"),
    ("intent misread", "intent_misread"),
    ("misunderstood", "intent_misread"),
    ("intent", "intent_misread"),
];

/// Classifies raw error text into a fixed error type; "unknown" when no
/// rubric entry matches.
pub fn classify_error_type(error: &str) -> &'static str {
    let lower = error.to_lowercase();
    RUBRIC
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, error_type)| *error_type)
        .unwrap_or("unknown")
}

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|'[^']*'"#).expect("quoted-literal pattern compiles"));
static NUMBERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("number pattern compiles"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space pattern compiles"));

/// Normalized-and-hashed fingerprint of a query: first 16 hex chars of the
/// SHA-256 of the normalized form.
pub fn fingerprint(query: &str) -> String {
    let lower = query.to_lowercase();
    let no_quotes = QUOTED.replace_all(&lower, "\"\"");
    let no_numbers = NUMBERS.replace_all(&no_quotes, "N");
    let normalized = SPACES.replace_all(no_numbers.trim(), " ");
    let digest = Sha256::digest(normalized.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}
