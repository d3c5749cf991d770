//! Typed configuration (§6.4): a flat payload of known options, with
//! environment variables overriding in-payload values and a legacy-name
//! mapping applied at load (§9 Design Notes).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retrieval arm weights, must sum to (approximately) 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrievalWeights {
    pub vector: f32,
    pub keyword: f32,
    pub graph: f32,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        use crate::constants::defaults::{GRAPH_WEIGHT, KEYWORD_WEIGHT, VECTOR_WEIGHT};
        Self {
            vector: VECTOR_WEIGHT,
            keyword: KEYWORD_WEIGHT,
            graph: GRAPH_WEIGHT,
        }
    }
}

/// The recognised configuration options of §6.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub user_id: String,
    pub graph_uri: String,
    pub graph_user: String,
    pub graph_password: String,
    pub volatile_url: String,
    pub l0_capacity: usize,
    pub l1_ttl_days: i64,
    pub batch_size: usize,
    pub importance_threshold: f32,
    pub l2_threshold: f32,
    pub consolidation_interval_seconds: u64,
    pub retrieval_weights: RetrievalWeights,
    pub retrieval_limit: usize,
    pub exploration_rate: f64,
    pub confidence_boost: f32,
    pub confidence_penalty: f32,
    pub experience_buffer_size: usize,
    pub min_experiences_for_strategy: usize,
    pub embedding_dimensions: usize,
}

impl Default for Config {
    fn default() -> Self {
        use crate::constants::defaults as d;
        Self {
            user_id: "default".to_string(),
            graph_uri: String::new(),
            graph_user: String::new(),
            graph_password: String::new(),
            volatile_url: String::new(),
            l0_capacity: d::L0_CAPACITY,
            l1_ttl_days: d::L1_TTL_DAYS,
            batch_size: d::BATCH_SIZE,
            importance_threshold: d::IMPORTANCE_THRESHOLD,
            l2_threshold: d::L2_THRESHOLD,
            consolidation_interval_seconds: d::CONSOLIDATION_INTERVAL_SECONDS,
            retrieval_weights: RetrievalWeights::default(),
            retrieval_limit: d::RETRIEVAL_LIMIT,
            exploration_rate: d::EXPLORATION_RATE,
            confidence_boost: d::CONFIDENCE_BOOST,
            confidence_penalty: d::CONFIDENCE_PENALTY,
            experience_buffer_size: d::EXPERIENCE_BUFFER_SIZE,
            min_experiences_for_strategy: d::MIN_EXPERIENCES_FOR_STRATEGY,
            embedding_dimensions: d::EMBEDDING_DIMENSIONS,
        }
    }
}

/// Maps legacy option names (carried over from the system this was distilled
/// from) to their canonical §6.4 names. Applied before everything else so
/// downstream code only ever sees canonical keys.
fn legacy_key_aliases() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("neo4j_uri", "graph_uri"),
        ("neo4j_user", "graph_user"),
        ("neo4j_password", "graph_password"),
        ("redis_url", "volatile_url"),
        ("llm_model", "completion_model"),
    ])
}

impl Config {
    /// Builds a [`Config`] from an arbitrary JSON mapping, applying legacy
    /// aliases, then overlaying environment variables (`UPPER_SNAKE_CASE`
    /// of the canonical key) on top. Unknown keys are preserved as no-ops
    /// rather than rejected, so the payload stays forward-compatible.
    #[must_use]
    pub fn from_payload(payload: &HashMap<String, Value>) -> Self {
        let aliases = legacy_key_aliases();
        let mut canonical: HashMap<String, Value> = HashMap::new();
        for (k, v) in payload {
            let key = aliases.get(k.as_str()).map_or(k.as_str(), |v| v);
            canonical.insert(key.to_string(), v.clone());
        }

        let mut config = Self::default();
        apply_field(&canonical, "user_id", &mut config.user_id);
        apply_field(&canonical, "graph_uri", &mut config.graph_uri);
        apply_field(&canonical, "graph_user", &mut config.graph_user);
        apply_field(&canonical, "graph_password", &mut config.graph_password);
        apply_field(&canonical, "volatile_url", &mut config.volatile_url);
        apply_field(&canonical, "l0_capacity", &mut config.l0_capacity);
        apply_field(&canonical, "l1_ttl_days", &mut config.l1_ttl_days);
        apply_field(&canonical, "batch_size", &mut config.batch_size);
        apply_field(&canonical, "importance_threshold", &mut config.importance_threshold);
        apply_field(&canonical, "l2_threshold", &mut config.l2_threshold);
        apply_field(
            &canonical,
            "consolidation_interval_seconds",
            &mut config.consolidation_interval_seconds,
        );
        apply_field(&canonical, "retrieval_limit", &mut config.retrieval_limit);
        apply_field(&canonical, "exploration_rate", &mut config.exploration_rate);
        apply_field(&canonical, "confidence_boost", &mut config.confidence_boost);
        apply_field(&canonical, "confidence_penalty", &mut config.confidence_penalty);
        apply_field(
            &canonical,
            "experience_buffer_size",
            &mut config.experience_buffer_size,
        );
        apply_field(
            &canonical,
            "min_experiences_for_strategy",
            &mut config.min_experiences_for_strategy,
        );
        apply_field(&canonical, "embedding_dimensions", &mut config.embedding_dimensions);
        if let Some(w) = canonical.get("retrieval_weights") {
            if let Ok(w) = serde_json::from_value::<RetrievalWeights>(w.clone()) {
                config.retrieval_weights = w;
            }
        }

        config.apply_env_overrides();
        config
    }

    /// Overlays `UPPER_SNAKE_CASE` environment variables onto scalar fields.
    fn apply_env_overrides(&mut self) {
        apply_env("USER_ID", &mut self.user_id);
        apply_env("GRAPH_URI", &mut self.graph_uri);
        apply_env("GRAPH_USER", &mut self.graph_user);
        apply_env("GRAPH_PASSWORD", &mut self.graph_password);
        apply_env("VOLATILE_URL", &mut self.volatile_url);
        apply_env_parsed("L0_CAPACITY", &mut self.l0_capacity);
        apply_env_parsed("L1_TTL_DAYS", &mut self.l1_ttl_days);
        apply_env_parsed("BATCH_SIZE", &mut self.batch_size);
        apply_env_parsed("IMPORTANCE_THRESHOLD", &mut self.importance_threshold);
        apply_env_parsed("L2_THRESHOLD", &mut self.l2_threshold);
        apply_env_parsed(
            "CONSOLIDATION_INTERVAL_SECONDS",
            &mut self.consolidation_interval_seconds,
        );
        apply_env_parsed("RETRIEVAL_LIMIT", &mut self.retrieval_limit);
        apply_env_parsed("EXPLORATION_RATE", &mut self.exploration_rate);
        apply_env_parsed("CONFIDENCE_BOOST", &mut self.confidence_boost);
        apply_env_parsed("CONFIDENCE_PENALTY", &mut self.confidence_penalty);
        apply_env_parsed("EXPERIENCE_BUFFER_SIZE", &mut self.experience_buffer_size);
        apply_env_parsed(
            "MIN_EXPERIENCES_FOR_STRATEGY",
            &mut self.min_experiences_for_strategy,
        );
        apply_env_parsed("EMBEDDING_DIMENSIONS", &mut self.embedding_dimensions);
    }
}

fn apply_field<T: for<'de> Deserialize<'de>>(map: &HashMap<String, Value>, key: &str, slot: &mut T) {
    if let Some(v) = map.get(key) {
        if let Ok(parsed) = serde_json::from_value(v.clone()) {
            *slot = parsed;
        }
    }
}

fn apply_env(name: &str, slot: &mut String) {
    if let Ok(v) = std::env::var(name) {
        *slot = v;
    }
}

fn apply_env_parsed<T: std::str::FromStr>(name: &str, slot: &mut T) {
    if let Ok(v) = std::env::var(name) {
        if let Ok(parsed) = v.parse() {
            *slot = parsed;
        }
    }
}
