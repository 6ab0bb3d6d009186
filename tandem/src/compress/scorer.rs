//! Message importance scoring.
//!
//! Each message gets a 0–10 score from its role, structural signals, and
//! recency. The compressor turns scores into preserve/compress/drop
//! decisions.

use crate::message::{Message, Role};

/// Filler phrases that carry no information worth keeping.
const FILLER: &[&str] = &[
    "ok", "okay", "thanks", "thank you", "yes", "no", "sure", "got it", "done", "great",
];

/// Signals that a message records an error worth keeping.
const ERROR_MARKERS: &[&str] = &[
    "error",
    "exception",
    "traceback",
    "stack trace",
    "panicked",
    "failed",
];

/// Score plus the classification that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageScore {
    /// 0–10.
    pub score: f64,
    /// Coarse type used in summaries: "tool_call", "error", "filler", "routine".
    pub kind: &'static str,
    pub reason: String,
}

fn base_for_role(role: Role) -> f64 {
    match role {
        Role::System => 6.0,
        Role::User => 5.0,
        Role::Assistant => 4.0,
        Role::Tool => 3.0,
    }
}

fn is_filler(content: &str) -> bool {
    let trimmed = content
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    trimmed.len() < 20 && (trimmed.is_empty() || FILLER.contains(&trimmed.as_str()))
}

fn has_error_content(content: &str) -> bool {
    let lower = content.to_lowercase();
    ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

/// Scores one message at `index` in a run of `total`.
pub fn score_message(message: &Message, index: usize, total: usize) -> MessageScore {
    let mut score = base_for_role(message.role);
    let mut kind = "routine";
    let mut notes: Vec<String> = vec![format!("role {}", message.role.as_str())];

    if message.has_tool_calls() {
        score += 3.0;
        kind = "tool_call";
        notes.push("carries tool calls".to_string());
    }
    if has_error_content(&message.content) {
        score += 2.0;
        if kind == "routine" {
            kind = "error";
        }
        notes.push("error content".to_string());
    }
    if is_filler(&message.content) {
        score -= 2.0;
        if kind == "routine" {
            kind = "filler";
        }
        notes.push("short or filler".to_string());
    }

    // Position from the end: the last three messages get a fading bonus.
    let distance_from_end = total.saturating_sub(index + 1);
    if distance_from_end < 3 {
        score += (3 - distance_from_end) as f64;
        notes.push("recent".to_string());
    }

    MessageScore {
        score: score.clamp(0.0, 10.0),
        kind,
        reason: notes.join("; "),
    }
}
