//! Bad-output detection: repetition loops, leaked control tokens, malformed
//! tool-argument JSON. Any hit downgrades the probe's score and feeds the
//! anti-pattern penalty.

use crate::provider::ResponseMessage;

/// Control tokens that must never appear in decoded content.
const LEAK_MARKERS: &[&str] = &[
    "<|im_end|>",
    "<|im_start|>",
    "<|endoftext|>",
    "<|eot_id|>",
    "<|assistant|>",
    "<|user|>",
    "[/INST]",
];

/// How many consecutive repeats of the same n-gram count as a loop.
const REPEAT_LIMIT: usize = 4;
const NGRAM_WORDS: usize = 3;

/// Flags raised on one response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BadOutput {
    pub repetition: bool,
    pub leaked_tokens: bool,
    pub malformed_arguments: bool,
}

impl BadOutput {
    pub fn any(&self) -> bool {
        self.repetition || self.leaked_tokens || self.malformed_arguments
    }

    /// Penalty contribution, 0–100.
    pub fn penalty(&self) -> f64 {
        let mut p: f64 = 0.0;
        if self.repetition {
            p += 40.0;
        }
        if self.leaked_tokens {
            p += 40.0;
        }
        if self.malformed_arguments {
            p += 30.0;
        }
        p.min(100.0)
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.repetition {
            parts.push("repetition loop");
        }
        if self.leaked_tokens {
            parts.push("leaked control tokens");
        }
        if self.malformed_arguments {
            parts.push("malformed tool arguments");
        }
        parts.join(", ")
    }
}

/// Inspects one response message.
pub fn inspect(message: &ResponseMessage) -> BadOutput {
    BadOutput {
        repetition: has_repetition_loop(&message.content),
        leaked_tokens: LEAK_MARKERS.iter().any(|m| message.content.contains(m)),
        malformed_arguments: message
            .tool_calls
            .iter()
            .any(|c| !c.arguments.trim().is_empty() && c.parsed_arguments().is_none()),
    }
}

/// True when the same word n-gram repeats more than `REPEAT_LIMIT` times in
/// immediate succession.
fn has_repetition_loop(content: &str) -> bool {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() < NGRAM_WORDS * (REPEAT_LIMIT + 1) {
        return false;
    }
    for start in 0..words.len() - NGRAM_WORDS {
        let ngram = &words[start..start + NGRAM_WORDS];
        let mut repeats = 1;
        let mut at = start + NGRAM_WORDS;
        while at + NGRAM_WORDS <= words.len() && &words[at..at + NGRAM_WORDS] == ngram {
            repeats += 1;
            if repeats > REPEAT_LIMIT {
                return true;
            }
            at += NGRAM_WORDS;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    fn text(content: &str) -> ResponseMessage {
        ResponseMessage {
            content: content.to_string(),
            tool_calls: Vec::new(),
        }
    }

    #[test]
    fn clean_output_raises_nothing() {
        let bad = inspect(&text("The port is 8443."));
        assert!(!bad.any());
        assert_eq!(bad.penalty(), 0.0);
    }

    #[test]
    fn repetition_loop_detected() {
        let looped = "I will help you I will help you I will help you I will help you I will help you I will help you";
        assert!(inspect(&text(looped)).repetition);
    }

    #[test]
    fn normal_prose_is_not_a_loop() {
        let prose = "First read the file, then edit the file, then run the tests, then commit the change to the repository.";
        assert!(!inspect(&text(prose)).repetition);
    }

    #[test]
    fn leaked_stop_strings_detected() {
        assert!(inspect(&text("done<|im_end|>")).leaked_tokens);
        assert!(!inspect(&text("done")).leaked_tokens);
    }

    #[test]
    fn malformed_arguments_detected() {
        let msg = ResponseMessage {
            content: String::new(),
            tool_calls: vec![ToolCall::new("c", "ping", "{broken")],
        };
        let bad = inspect(&msg);
        assert!(bad.malformed_arguments);
        assert_eq!(bad.penalty(), 30.0);
    }

    #[test]
    fn penalty_caps_at_one_hundred() {
        let bad = BadOutput {
            repetition: true,
            leaked_tokens: true,
            malformed_arguments: true,
        };
        assert_eq!(bad.penalty(), 100.0);
    }
}
