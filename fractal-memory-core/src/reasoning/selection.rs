//! ε-greedy strategy selection (§4.5 `select`).

use rand::RngExt;

use crate::types::Strategy;

/// With probability `epsilon`, uniformly picks among `candidates`;
/// otherwise picks the max-confidence candidate. Returns `None` if
/// `candidates` is empty.
#[must_use]
pub fn select_epsilon_greedy(candidates: &[Strategy], epsilon: f64) -> Option<Strategy> {
    if candidates.is_empty() {
        return None;
    }
    let mut rng = rand::rng();
    if rng.random_bool(epsilon) {
        let idx = rng.random_range(0..candidates.len());
        return Some(candidates[idx].clone());
    }
    candidates
        .iter()
        .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_for_empty_candidates() {
        assert!(select_epsilon_greedy(&[], 0.1).is_none());
    }

    #[test]
    fn exploitation_picks_max_confidence_when_epsilon_zero() {
        let a = Strategy::new("u1", "a", "t", 0.3, false);
        let b = Strategy::new("u1", "b", "t", 0.9, false);
        let picked = select_epsilon_greedy(&[a, b.clone()], 0.0).unwrap();
        assert_eq!(picked.id, b.id);
    }
}
