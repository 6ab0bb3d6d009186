//! Smart context compression: score messages, fold low-value runs into
//! summaries, preserve tool calls and recency.
//!
//! The decision list always has the same length as the input; preserved +
//! compressed + dropped = total.

mod scorer;

pub use scorer::{score_message, MessageScore};

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::Message;

/// Token estimate used throughout: ceil(len / 4).
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() as u32).div_ceil(4)
}

/// Compression aggressiveness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    /// Preserve ≥ 7, drop ≤ 3, groups of 3.
    Conservative,
    /// Preserve ≥ 8, drop ≤ 4, groups of 5.
    Aggressive,
    /// Thresholds derived from this run's score distribution, groups of 4.
    ContextAware,
}

#[derive(Clone, Debug)]
pub struct CompressorConfig {
    pub mode: CompressionMode,
    /// The last N messages are always preserved.
    pub skip_last: usize,
    /// Messages carrying tool calls are always preserved.
    pub preserve_tool_calls: bool,
    pub max_summary_length: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            mode: CompressionMode::Conservative,
            skip_last: 5,
            preserve_tool_calls: true,
            max_summary_length: 300,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAction {
    Preserve,
    Compress,
    Drop,
}

/// Per-message decision; one per input message.
#[derive(Clone, Debug, Serialize)]
pub struct CompressionDecision {
    pub action: CompressionAction,
    pub original_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_tokens: Option<u32>,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CompressionStats {
    pub preserved: usize,
    pub compressed: usize,
    pub dropped: usize,
    pub original_tokens: u32,
    pub compressed_tokens: u32,
    pub ratio: f64,
    pub duration_ms: u64,
}

#[derive(Clone, Debug)]
pub struct CompressionResult {
    pub messages: Vec<Message>,
    pub decisions: Vec<CompressionDecision>,
    pub stats: CompressionStats,
}

struct Thresholds {
    preserve_min: f64,
    drop_max: f64,
    group_size: usize,
}

fn thresholds(mode: CompressionMode, scores: &[MessageScore]) -> Thresholds {
    match mode {
        CompressionMode::Conservative => Thresholds {
            preserve_min: 7.0,
            drop_max: 3.0,
            group_size: 3,
        },
        CompressionMode::Aggressive => Thresholds {
            preserve_min: 8.0,
            drop_max: 4.0,
            group_size: 5,
        },
        CompressionMode::ContextAware => {
            let mut sorted: Vec<f64> = scores.iter().map(|s| s.score).collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mean = if sorted.is_empty() {
                5.0
            } else {
                sorted.iter().sum::<f64>() / sorted.len() as f64
            };
            let median = if sorted.is_empty() {
                5.0
            } else {
                sorted[sorted.len() / 2]
            };
            Thresholds {
                preserve_min: mean.max(median),
                drop_max: mean / 2.0,
                group_size: 4,
            }
        }
    }
}

/// Truncates to at most `max` bytes, preferring the last sentence boundary;
/// the ellipsis fits inside the budget.
fn truncate_at_sentence(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max.saturating_sub('…'.len_utf8());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &text[..cut];
    match head.rfind(['.', '!', '?']) {
        Some(boundary) if boundary > max / 2 => head[..=boundary].to_string(),
        _ => format!("{head}…"),
    }
}

fn snippet(text: &str, max: usize) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_at_sentence(&line, max)
}

/// Builds the summary text for one compress group.
fn summarize_group(group: &[(usize, &Message, &MessageScore)], max_length: usize) -> String {
    let roles: Vec<&str> = group.iter().map(|(_, m, _)| m.role.as_str()).collect();
    let mut kinds: Vec<&str> = group.iter().map(|(_, _, s)| s.kind).collect();
    kinds.sort_unstable();
    kinds.dedup();

    let mut top: Vec<&(usize, &Message, &MessageScore)> = group.iter().collect();
    top.sort_by(|a, b| b.2.score.total_cmp(&a.2.score));
    let bullets: Vec<String> = top
        .iter()
        .take(3)
        .map(|(_, m, s)| format!("• [{}, {:.1}] {}", s.kind, s.score, snippet(&m.content, 60)))
        .collect();

    let summary = format!(
        "Summarized {} messages [{}]; types: {}; {}",
        group.len(),
        roles.join(", "),
        kinds.join(","),
        bullets.join(" ")
    );
    truncate_at_sentence(&summary, max_length)
}

/// Compresses a transcript. Decisions line up 1:1 with the input.
pub fn compress(messages: &[Message], config: &CompressorConfig) -> CompressionResult {
    let started = Instant::now();
    let total = messages.len();
    let scores: Vec<MessageScore> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| score_message(m, i, total))
        .collect();
    let t = thresholds(config.mode, &scores);

    // Per-message action; always-preserve rules override scores.
    let actions: Vec<(CompressionAction, String)> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let score = &scores[i];
            if total - i <= config.skip_last {
                return (CompressionAction::Preserve, "within skip-last window".to_string());
            }
            if config.preserve_tool_calls && m.has_tool_calls() {
                return (CompressionAction::Preserve, "carries tool calls".to_string());
            }
            if score.score >= t.preserve_min {
                (
                    CompressionAction::Preserve,
                    format!("score {:.1} above preserve threshold", score.score),
                )
            } else if score.score <= t.drop_max {
                (
                    CompressionAction::Drop,
                    format!("score {:.1} below drop threshold; {}", score.score, score.reason),
                )
            } else {
                (
                    CompressionAction::Compress,
                    format!("score {:.1} mid-band", score.score),
                )
            }
        })
        .collect();

    // Fold consecutive same-action runs; compress runs split at group size.
    let mut out_messages: Vec<Message> = Vec::new();
    let mut decisions: Vec<Option<CompressionDecision>> = vec![None; total];
    let mut stats = CompressionStats::default();

    let mut i = 0;
    while i < total {
        let action = actions[i].0;
        let mut j = i;
        while j < total && actions[j].0 == action {
            j += 1;
        }
        match action {
            CompressionAction::Preserve => {
                for k in i..j {
                    out_messages.push(messages[k].clone());
                    let tokens = estimate_tokens(&messages[k].content);
                    stats.preserved += 1;
                    stats.compressed_tokens += tokens;
                    decisions[k] = Some(CompressionDecision {
                        action,
                        original_tokens: tokens,
                        compressed_tokens: None,
                        reason: actions[k].1.clone(),
                    });
                }
            }
            CompressionAction::Drop => {
                for k in i..j {
                    stats.dropped += 1;
                    decisions[k] = Some(CompressionDecision {
                        action,
                        original_tokens: estimate_tokens(&messages[k].content),
                        compressed_tokens: None,
                        reason: actions[k].1.clone(),
                    });
                }
            }
            CompressionAction::Compress => {
                let mut start = i;
                while start < j {
                    let end = (start + t.group_size).min(j);
                    let group: Vec<(usize, &Message, &MessageScore)> = (start..end)
                        .map(|k| (k, &messages[k], &scores[k]))
                        .collect();
                    // The summary never outweighs what it replaces.
                    let group_chars: usize = group.iter().map(|(_, m, _)| m.content.len()).sum();
                    let budget = config.max_summary_length.min(group_chars);
                    let summary = summarize_group(&group, budget);
                    let summary_tokens = estimate_tokens(&summary);
                    let share = (summary_tokens / group.len() as u32).max(1);
                    for (k, _, _) in &group {
                        stats.compressed += 1;
                        decisions[*k] = Some(CompressionDecision {
                            action,
                            original_tokens: estimate_tokens(&messages[*k].content),
                            compressed_tokens: Some(share),
                            reason: actions[*k].1.clone(),
                        });
                    }
                    stats.compressed_tokens += summary_tokens;
                    out_messages.push(Message::system(summary).with_source("compressor"));
                    start = end;
                }
            }
        }
        i = j;
    }

    stats.original_tokens = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
    stats.ratio = if stats.original_tokens == 0 {
        1.0
    } else {
        f64::from(stats.compressed_tokens) / f64::from(stats.original_tokens)
    };
    stats.duration_ms = started.elapsed().as_millis() as u64;
    debug!(
        preserved = stats.preserved,
        compressed = stats.compressed,
        dropped = stats.dropped,
        ratio = stats.ratio,
        "compression done"
    );

    CompressionResult {
        messages: out_messages,
        decisions: decisions.into_iter().map(|d| d.expect("every message decided")).collect(),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    fn long_user(text: &str) -> Message {
        Message::user(format!(
            "{text} - and a longer body of routine discussion to give the message some weight."
        ))
    }

    #[test]
    fn counts_always_add_up() {
        let messages: Vec<Message> = (0..12).map(|i| long_user(&format!("msg {i}"))).collect();
        let result = compress(&messages, &CompressorConfig::default());
        assert_eq!(result.decisions.len(), 12);
        assert_eq!(
            result.stats.preserved + result.stats.compressed + result.stats.dropped,
            12
        );
        assert!(result.stats.compressed_tokens <= result.stats.original_tokens);
    }

    #[test]
    fn short_input_within_skip_last_is_untouched() {
        let messages: Vec<Message> = (0..4).map(|i| Message::user(format!("m{i}"))).collect();
        let result = compress(&messages, &CompressorConfig::default());
        assert_eq!(result.messages.len(), 4);
        assert!(result
            .decisions
            .iter()
            .all(|d| d.action == CompressionAction::Preserve));
    }

    #[test]
    fn tool_calls_and_recency_are_preserved() {
        // Twenty messages; 3, 7, 12 (1-indexed) carry tool calls.
        let mut messages: Vec<Message> = (0..20).map(|i| long_user(&format!("msg {i}"))).collect();
        for idx in [2usize, 6, 11] {
            messages[idx] = Message::assistant("calling")
                .with_tool_calls(vec![ToolCall::new("c", "read_file", "{}")]);
        }
        let result = compress(&messages, &CompressorConfig::default());

        for idx in [2usize, 6, 11] {
            assert_eq!(
                result.decisions[idx].action,
                CompressionAction::Preserve,
                "tool-call message {idx} must be preserved"
            );
        }
        for idx in 15..20 {
            assert_eq!(result.decisions[idx].action, CompressionAction::Preserve);
        }
        assert!(result.messages.len() <= 20);
        // The preserved originals appear unchanged in the output.
        assert!(result.messages.iter().any(|m| m.has_tool_calls()));
    }

    #[test]
    fn compressed_groups_become_summaries() {
        let messages: Vec<Message> = (0..16).map(|i| long_user(&format!("routine {i}"))).collect();
        let config = CompressorConfig {
            mode: CompressionMode::Aggressive,
            ..CompressorConfig::default()
        };
        let result = compress(&messages, &config);
        let summaries: Vec<&Message> = result
            .messages
            .iter()
            .filter(|m| m.source.as_deref() == Some("compressor"))
            .collect();
        assert!(!summaries.is_empty());
        for s in summaries {
            assert!(s.content.starts_with("Summarized"));
            assert!(s.content.len() <= config.max_summary_length);
        }
    }

    #[test]
    fn filler_gets_dropped_in_aggressive_mode() {
        let mut messages: Vec<Message> = Vec::new();
        for _ in 0..8 {
            messages.push(Message::user("ok"));
        }
        for i in 0..6 {
            messages.push(long_user(&format!("real content {i}")));
        }
        let config = CompressorConfig {
            mode: CompressionMode::Aggressive,
            ..CompressorConfig::default()
        };
        let result = compress(&messages, &config);
        assert!(result.stats.dropped > 0);
        // Dropped groups contribute nothing to the output.
        assert!(result.messages.len() < messages.len());
    }

    #[test]
    fn context_aware_derives_thresholds_from_distribution() {
        let messages: Vec<Message> = (0..15).map(|i| long_user(&format!("msg {i}"))).collect();
        let config = CompressorConfig {
            mode: CompressionMode::ContextAware,
            ..CompressorConfig::default()
        };
        let result = compress(&messages, &config);
        assert_eq!(result.decisions.len(), 15);
        assert_eq!(
            result.stats.preserved + result.stats.compressed + result.stats.dropped,
            15
        );
    }

    #[test]
    fn sentence_boundary_truncation() {
        let text = "First sentence. Second sentence. Third one that runs long and will be cut somewhere in the middle of it";
        let out = truncate_at_sentence(text, 40);
        assert!(out.len() <= 41);
        assert!(out.ends_with('.') || out.ends_with('…'));
    }

    #[test]
    fn token_estimate_is_ceil_len_over_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
