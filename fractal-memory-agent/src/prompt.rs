//! Fast-path prompt assembly (§4.6 step 4): a system preamble, recalled
//! context truncated to a character budget standing in for a token budget
//! (no tokenizer dependency at this layer), and up to two strategy hints.

use fractal_memory_core::types::{RecallResult, Strategy};

/// Approximate token budget for context snippets, in characters (roughly 4
/// chars/token for English text).
const CONTEXT_CHAR_BUDGET: usize = 4_000;

const SYSTEM_PREAMBLE: &str =
    "You are a helpful assistant with access to the user's prior conversation history and \
     previously learned task strategies. Use the context below when relevant; ignore it otherwise.";

#[must_use]
pub fn build_prompt(message: &str, context: &[RecallResult], strategies: &[Strategy]) -> String {
    let mut out = String::new();
    out.push_str(SYSTEM_PREAMBLE);
    out.push_str("\n\n");

    if !context.is_empty() {
        out.push_str("Context:\n");
        let mut used = 0usize;
        for hit in context {
            let line = format!("- {}\n", hit.content);
            if used + line.len() > CONTEXT_CHAR_BUDGET {
                break;
            }
            used += line.len();
            out.push_str(&line);
        }
        out.push('\n');
    }

    for strategy in strategies.iter().take(2) {
        let verb = if strategy.anti_pattern { "AVOID" } else { "DO" };
        out.push_str(&format!("{verb}: {}\n", strategy.description));
    }
    if !strategies.is_empty() {
        out.push('\n');
    }

    out.push_str("User: ");
    out.push_str(message);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fractal_memory_core::types::Tier;
    use std::collections::HashMap;

    fn hit(content: &str) -> RecallResult {
        RecallResult {
            episode_id: "e1".into(),
            content: content.into(),
            score: 1.0,
            source: Tier::L0,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn renders_do_and_avoid_hints() {
        let good = Strategy::new("u1", "always run the test suite first", "coding", 0.9, false);
        let bad = Strategy::new("u1", "never force-push shared branches", "coding", 0.9, true);
        let prompt = build_prompt("fix the bug", &[hit("earlier we discussed retries")], &[good, bad]);
        assert!(prompt.contains("DO: always run the test suite first"));
        assert!(prompt.contains("AVOID: never force-push shared branches"));
        assert!(prompt.contains("earlier we discussed retries"));
    }

    #[test]
    fn truncates_context_to_budget() {
        let huge = "x".repeat(CONTEXT_CHAR_BUDGET * 2);
        let prompt = build_prompt("hello", &[hit(&huge), hit("short")], &[]);
        assert!(prompt.len() < huge.len() + 200);
    }
}
