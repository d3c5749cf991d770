//! Common-keyword signature extraction (§4.5 `extract_strategies`).

use std::collections::HashMap;

use crate::types::{Experience, Outcome, Strategy};

const MIN_TOKEN_LEN: usize = 3;
const MIN_GROUP_SIZE: usize = 2;

/// Groups `buffer` by task-type, then for each group meeting
/// `min_group_for_extraction` splits into successes/failures and emits a
/// strategy for each side with at least [`MIN_GROUP_SIZE`] members.
#[must_use]
pub fn extract_strategies_from_buffer(
    user: &str,
    buffer: &[Experience],
    min_group_for_extraction: usize,
) -> Vec<Strategy> {
    let mut by_type: HashMap<&str, Vec<&Experience>> = HashMap::new();
    for exp in buffer {
        by_type.entry(exp.task_type.as_str()).or_default().push(exp);
    }

    let mut strategies = Vec::new();
    for (task_type, experiences) in by_type {
        if experiences.len() < min_group_for_extraction {
            continue;
        }
        let successes: Vec<&&Experience> = experiences
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Success))
            .collect();
        let failures: Vec<&&Experience> = experiences
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Failure))
            .collect();

        if successes.len() >= MIN_GROUP_SIZE {
            let tokens = common_keyword_signature(successes.iter().map(|e| e.action.as_str()));
            if !tokens.is_empty() {
                let confidence = (0.5 + 0.1 * successes.len() as f32).min(0.9);
                strategies.push(Strategy::new(
                    user,
                    format!("For {task_type}: {}", tokens.join(" ")),
                    task_type,
                    confidence,
                    false,
                ));
            }
        }

        if failures.len() >= MIN_GROUP_SIZE {
            let tokens = common_keyword_signature(failures.iter().map(|e| e.action.as_str()));
            if !tokens.is_empty() {
                strategies.push(Strategy::new(
                    user,
                    format!("AVOID for {task_type}: {}", tokens.join(" ")),
                    task_type,
                    0.1,
                    true,
                ));
            }
        }
    }
    strategies
}

/// Tokens longer than [`MIN_TOKEN_LEN`] present in more than half of
/// `texts`, ranked by frequency (highest first).
fn common_keyword_signature<'a>(texts: impl Iterator<Item = &'a str> + Clone) -> Vec<String> {
    let total = texts.clone().count();
    if total == 0 {
        return Vec::new();
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        let mut seen_in_text = std::collections::HashSet::new();
        for word in text.split_whitespace() {
            let token: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if token.len() > MIN_TOKEN_LEN && seen_in_text.insert(token.clone()) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
    }
    let threshold = total / 2;
    let mut ranked: Vec<(String, usize)> = counts.into_iter().filter(|(_, c)| *c > threshold).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().map(|(token, _)| token).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn exp(task_type: &str, action: &str, outcome: Outcome) -> Experience {
        Experience {
            id: "x".to_string(),
            task_description: "d".to_string(),
            task_type: task_type.to_string(),
            context: Map::new(),
            action: action.to_string(),
            outcome,
            reasoning: String::new(),
            error: None,
            timestamp: chrono::Utc::now(),
            episode_id: None,
            strategy_id: None,
            user_id: "u1".to_string(),
        }
    }

    #[test]
    fn extracts_success_strategy_with_shared_tokens() {
        let buffer = vec![
            exp("testing", "write assert validate output", Outcome::Success),
            exp("testing", "write assert check output", Outcome::Success),
        ];
        let strategies = extract_strategies_from_buffer("u1", &buffer, 2);
        assert_eq!(strategies.len(), 1);
        assert!(strategies[0].description.starts_with("For testing:"));
        assert!(!strategies[0].anti_pattern);
    }

    #[test]
    fn extracts_failure_strategy_as_anti_pattern() {
        let buffer = vec![
            exp("testing", "skip validation entirely", Outcome::Failure),
            exp("testing", "skip validation again", Outcome::Failure),
        ];
        let strategies = extract_strategies_from_buffer("u1", &buffer, 2);
        assert_eq!(strategies.len(), 1);
        assert!(strategies[0].description.starts_with("AVOID for testing:"));
        assert!(strategies[0].anti_pattern);
        assert!((strategies[0].confidence - 0.1).abs() < 1e-6);
    }

    #[test]
    fn skips_groups_below_minimum() {
        let buffer = vec![exp("testing", "write assert", Outcome::Success)];
        let strategies = extract_strategies_from_buffer("u1", &buffer, 2);
        assert!(strategies.is_empty());
    }
}
