//! Centralized magic numbers and default configuration values.

/// Default configuration values (see §6.4 of the design).
pub mod defaults {
    pub const L0_CAPACITY: usize = 500;
    pub const L0_CAPACITY_MAX: usize = 10_000;
    pub const L1_TTL_DAYS: i64 = 30;
    pub const BATCH_SIZE: usize = 15;
    pub const IMPORTANCE_THRESHOLD: f32 = 0.3;
    pub const L2_THRESHOLD: f32 = 0.7;
    pub const CONSOLIDATION_INTERVAL_SECONDS: u64 = 300;
    pub const RETRIEVAL_LIMIT: usize = 5;
    pub const EXPLORATION_RATE: f64 = 0.1;
    pub const CONFIDENCE_BOOST: f32 = 0.05;
    pub const CONFIDENCE_PENALTY: f32 = 0.10;
    pub const EXPERIENCE_BUFFER_SIZE: usize = 100;
    pub const MIN_EXPERIENCES_FOR_STRATEGY: usize = 3;
    pub const EMBEDDING_DIMENSIONS: usize = 1536;

    pub const VECTOR_WEIGHT: f32 = 0.5;
    pub const KEYWORD_WEIGHT: f32 = 0.3;
    pub const GRAPH_WEIGHT: f32 = 0.2;
    pub const RRF_K: f32 = 60.0;

    pub const CONSOLIDATION_LOCK_TTL_SECS: u64 = 60;
    pub const GC_GRACE_DAYS: i64 = 7;
    pub const GC_LIVE_STALE_DAYS: i64 = 30;

    pub const MAX_EPISODE_CONTENT_LEN: usize = 100_000;
    pub const HARD_DELETE_BATCH_LIMIT: usize = 1_000;
    pub const LOWER_TIER_BUDGET_REDUCTION: f32 = 0.5;
}

/// Retry/backoff defaults (see §7).
pub mod retry {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY_MS: u64 = 100;
    pub const MAX_DELAY_MS: u64 = 2_000;
}

/// Fixed key shapes for the volatile store (see §6.2 — prescriptive, tooling
/// depends on them).
pub mod keys {
    #[must_use]
    pub fn l0_stream(user: &str) -> String {
        format!("memory:{user}:l0")
    }

    #[must_use]
    pub fn l1_hash(user: &str, session_id: &str) -> String {
        format!("memory:{user}:l1:{session_id}")
    }

    #[must_use]
    pub fn consolidation_lock(user: &str) -> String {
        format!("memory:{user}:consolidation_lock")
    }

    #[must_use]
    pub fn consolidated_set(user: &str) -> String {
        format!("memory:{user}:consolidated_set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes_match_wire_model() {
        assert_eq!(keys::l0_stream("alice"), "memory:alice:l0");
        assert_eq!(keys::l1_hash("alice", "s1"), "memory:alice:l1:s1");
        assert_eq!(
            keys::consolidation_lock("alice"),
            "memory:alice:consolidation_lock"
        );
        assert_eq!(
            keys::consolidated_set("alice"),
            "memory:alice:consolidated_set"
        );
    }

    #[test]
    fn thresholds_are_sane() {
        assert!(defaults::IMPORTANCE_THRESHOLD < defaults::L2_THRESHOLD);
        assert!(defaults::L0_CAPACITY <= defaults::L0_CAPACITY_MAX);
    }
}
