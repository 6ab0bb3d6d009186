//! Context-latency sweep: walk exponentially growing context sizes and
//! derive a speed rating and recommended operating context.
//!
//! The sweep stops at the first size whose latency crosses the ceiling, or
//! when the model's maximum context is reached, whichever comes first.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::Message;
use crate::provider::{CallOptions, ChatBackend};

/// Context sizes (tokens) the sweep walks through, in order.
pub const SWEEP_SIZES: &[u32] = &[2048, 4096, 8192, 16384, 32768, 65536];

/// Wall-clock ceiling: the sweep stops once a step reaches this latency.
pub const LATENCY_CEILING_MS: u64 = 8000;

/// Latency a context size should stay under to be recommended for routine use.
const COMFORT_MS: u64 = 2000;

/// Qualitative speed rating from the best observed latency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedRating {
    Excellent,
    Good,
    Acceptable,
    Slow,
    VerySlow,
}

impl SpeedRating {
    pub fn from_latency_ms(ms: u64) -> Self {
        match ms {
            0..=499 => SpeedRating::Excellent,
            500..=1999 => SpeedRating::Good,
            2000..=4999 => SpeedRating::Acceptable,
            5000..=9999 => SpeedRating::Slow,
            _ => SpeedRating::VerySlow,
        }
    }
}

/// One observation of the sweep.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LatencyPoint {
    pub context_size: u32,
    pub latency_ms: u64,
}

/// The derived curve.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LatencyCurve {
    pub points: Vec<LatencyPoint>,
    /// Largest size that stayed under the ceiling.
    pub max_usable_context: u32,
    /// Largest size that stayed comfortable; falls back to max usable.
    pub recommended_context: u32,
    pub min_latency_ms: u64,
    pub speed_rating: SpeedRating,
}

impl LatencyCurve {
    fn from_points(points: Vec<LatencyPoint>) -> Self {
        let usable: Vec<&LatencyPoint> = points
            .iter()
            .filter(|p| p.latency_ms < LATENCY_CEILING_MS)
            .collect();
        let max_usable_context = usable.iter().map(|p| p.context_size).max().unwrap_or(0);
        let recommended_context = usable
            .iter()
            .filter(|p| p.latency_ms <= COMFORT_MS)
            .map(|p| p.context_size)
            .max()
            .unwrap_or(max_usable_context);
        let min_latency_ms = points.iter().map(|p| p.latency_ms).min().unwrap_or(0);
        let speed_rating = if points.is_empty() {
            SpeedRating::VerySlow
        } else {
            SpeedRating::from_latency_ms(min_latency_ms)
        };
        Self {
            points,
            max_usable_context,
            recommended_context,
            min_latency_ms,
            speed_rating,
        }
    }
}

/// Filler prose sized to roughly `tokens` (4 chars ≈ 1 token).
fn filler(tokens: u32) -> String {
    const SENTENCE: &str = "The quick brown fox jumps over the lazy dog near the river bank. ";
    let target_chars = tokens as usize * 4;
    let mut out = String::with_capacity(target_chars + SENTENCE.len());
    while out.len() < target_chars {
        out.push_str(SENTENCE);
    }
    out
}

/// Runs the sweep. Each step is one-turn; the caller's timeout bounds each
/// call independently of the ceiling.
pub async fn sweep(
    backend: &dyn ChatBackend,
    model: &str,
    timeout: std::time::Duration,
    model_max_context: Option<u32>,
) -> LatencyCurve {
    let mut points = Vec::new();
    for &size in SWEEP_SIZES {
        if model_max_context.is_some_and(|max| size > max) {
            debug!(model, size, "sweep stopped at model max");
            break;
        }
        let messages = vec![
            Message::system("Answer briefly."),
            Message::user(format!(
                "{}\n\nReply with the single word: ready.",
                filler(size.saturating_sub(64))
            )),
        ];
        match backend
            .chat(model, &messages, None, &CallOptions::deterministic(timeout))
            .await
        {
            Ok(response) => {
                let latency_ms = response.latency_ms;
                points.push(LatencyPoint {
                    context_size: size,
                    latency_ms,
                });
                if latency_ms >= LATENCY_CEILING_MS {
                    debug!(model, size, latency_ms, "sweep stopped at latency ceiling");
                    break;
                }
            }
            Err(e) => {
                // Context overflow or transport trouble both end the walk;
                // anything already measured still forms the curve.
                debug!(model, size, error = %e, "sweep stopped on error");
                break;
            }
        }
    }
    LatencyCurve::from_points(points)
}
