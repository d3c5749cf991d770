//! Reasoning Bank (§4.5): logs experiences, extracts recurring strategies
//! from their common-keyword signature, selects under exploration/
//! exploitation, and reinforces confidence by observed outcome.

mod extraction;
mod selection;

pub use extraction::extract_strategies_from_buffer;
pub use selection::select_epsilon_greedy;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::store::graph::GraphStore;
use crate::types::{Episode, Experience, Outcome, Primitive, Strategy};

/// Tunables the reasoning bank needs from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub experience_buffer_size: usize,
    pub min_experiences_for_strategy: usize,
    pub exploration_rate: f64,
    pub confidence_boost: f32,
    pub confidence_penalty: f32,
}

/// Records attempts, extracts strategies, and reinforces confidence.
pub struct ReasoningBank {
    graph: Arc<dyn GraphStore>,
    config: ReasoningConfig,
    buffer: Mutex<Vec<Experience>>,
}

impl ReasoningBank {
    #[must_use]
    pub fn new(graph: Arc<dyn GraphStore>, config: ReasoningConfig) -> Self {
        Self { graph, config, buffer: Mutex::new(Vec::new()) }
    }

    /// Appends an experience to the buffer and persists it as an Episode.
    /// Triggers [`Self::extract_strategies`] once the buffer reaches
    /// `experience_buffer_size`.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::Error::StoreUnavailable`] from the
    /// underlying graph store write.
    #[instrument(skip(self, context))]
    pub async fn log_experience(
        &self,
        user: &str,
        task_description: &str,
        task_type: &str,
        context: HashMap<String, Primitive>,
        action: &str,
        outcome: Outcome,
        reasoning: &str,
        error: Option<String>,
    ) -> Result<String> {
        let experience = Experience {
            id: Uuid::new_v4().to_string(),
            task_description: task_description.to_string(),
            task_type: task_type.to_string(),
            context,
            action: action.to_string(),
            outcome,
            reasoning: reasoning.to_string(),
            error,
            timestamp: chrono::Utc::now(),
            episode_id: None,
            strategy_id: None,
            user_id: user.to_string(),
        };

        let importance = if matches!(outcome, Outcome::Failure) { 1.0 } else { 0.8 };
        let payload = serde_json::to_string(&experience)?;
        let mut episode = Episode::new(user, payload, importance)?;
        episode.source = "experience_log".to_string();
        self.graph.upsert_episode(&episode, &[]).await?;

        let should_extract = {
            let mut buffer = self.buffer.lock();
            buffer.push(experience.clone());
            buffer.len() >= self.config.experience_buffer_size
        };
        if should_extract {
            let _ = self.extract_strategies(user).await?;
        }

        Ok(experience.id)
    }

    /// Groups the buffer by task-type and emits new strategies for groups
    /// meeting `min_experiences_for_strategy` (§4.5). Clears the buffer on
    /// successful extraction.
    #[instrument(skip(self))]
    pub async fn extract_strategies(&self, user: &str) -> Result<Vec<Strategy>> {
        let buffer = self.buffer.lock().clone();
        let strategies = extract_strategies_from_buffer(user, &buffer, self.config.min_experiences_for_strategy);

        for strategy in &strategies {
            let payload = serde_json::to_string(strategy)?;
            let mut episode = Episode::new(user, payload, strategy.confidence)?;
            episode.source = "strategy".to_string();
            self.graph.upsert_episode(&episode, &[]).await?;
        }

        if !strategies.is_empty() {
            self.buffer.lock().clear();
        }
        Ok(strategies)
    }

    /// Returns up to `limit` strategies relevant to `task_type`, ranked by
    /// confidence. Anti-patterns are only included when `include_anti` is
    /// set (§4.5).
    pub async fn strategies_for(
        &self,
        user: &str,
        task_type: Option<&str>,
        limit: usize,
        include_anti: bool,
    ) -> Result<Vec<Strategy>> {
        let all = self.load_strategies(user).await?;
        let mut matching: Vec<Strategy> = all
            .into_iter()
            .filter(|s| !s.deleted)
            .filter(|s| include_anti || !s.anti_pattern)
            .filter(|s| task_type.map_or(true, |t| s.task_types.iter().any(|tt| tt == t)))
            .collect();
        matching.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        matching.truncate(limit);
        Ok(matching)
    }

    /// ε-greedy strategy selection among non-anti-pattern candidates for
    /// `task_type`.
    pub async fn select(&self, user: &str, task_type: Option<&str>) -> Result<Option<Strategy>> {
        let candidates = self.strategies_for(user, task_type, usize::MAX, false).await?;
        Ok(select_epsilon_greedy(&candidates, self.config.exploration_rate))
    }

    /// Reinforces a strategy's confidence by observed outcome (§4.5). A
    /// strategy with `failure_count > 5` incurs a second, compounding
    /// decrement on the same call.
    pub async fn update(&self, user: &str, strategy_id: &str, outcome: Outcome) -> Result<Strategy> {
        let mut strategy = self
            .load_strategy(user, strategy_id)
            .await?
            .ok_or_else(|| crate::error::Error::NotFound(strategy_id.to_string()))?;

        match outcome {
            Outcome::Success => {
                strategy.success_count += 1;
                strategy.confidence = (strategy.confidence + self.config.confidence_boost).min(1.0);
            }
            Outcome::Failure => {
                strategy.failure_count += 1;
                strategy.confidence = (strategy.confidence - self.config.confidence_penalty).max(0.0);
                if strategy.failure_count > 5 {
                    strategy.confidence = (strategy.confidence - self.config.confidence_penalty).max(0.0);
                }
            }
            Outcome::Partial | Outcome::Unknown | Outcome::None => {}
        }
        strategy.last_used_at = Some(chrono::Utc::now());

        let payload = serde_json::to_string(&strategy)?;
        let mut episode = Episode::new(user, payload, strategy.confidence)?;
        episode.id = strategy_episode_id(&strategy.id);
        episode.source = "strategy".to_string();
        self.graph.upsert_episode(&episode, &[]).await?;
        Ok(strategy)
    }

    /// Low-confidence or explicitly-flagged strategies for `task_type`.
    pub async fn anti_patterns(&self, user: &str, task_type: Option<&str>, limit: usize) -> Result<Vec<Strategy>> {
        let all = self.load_strategies(user).await?;
        let mut matching: Vec<Strategy> = all
            .into_iter()
            .filter(|s| !s.deleted)
            .filter(|s| s.anti_pattern || s.confidence < 0.2)
            .filter(|s| task_type.map_or(true, |t| s.task_types.iter().any(|tt| tt == t)))
            .collect();
        matching.sort_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn load_strategies(&self, user: &str) -> Result<Vec<Strategy>> {
        let episodes = self.graph.list_tier(user, crate::types::Tier::L2, usize::MAX).await?;
        Ok(episodes
            .into_iter()
            .filter(|e| e.source == "strategy" && !e.deleted)
            .filter_map(|e| serde_json::from_str::<Strategy>(&e.content).ok())
            .collect())
    }

    async fn load_strategy(&self, user: &str, strategy_id: &str) -> Result<Option<Strategy>> {
        Ok(self.load_strategies(user).await?.into_iter().find(|s| s.id == strategy_id))
    }
}

/// Deterministic episode id for a strategy's canonical record, so repeated
/// `update` calls upsert the same node instead of forking history.
fn strategy_episode_id(strategy_id: &str) -> String {
    format!("strategy:{strategy_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    use crate::store::graph::ScoredEpisode;
    use crate::types::Entity;

    #[derive(Default)]
    struct FakeGraph {
        episodes: StdMutex<HashMap<String, Episode>>,
    }

    #[async_trait]
    impl GraphStore for FakeGraph {
        async fn upsert_episode(&self, episode: &Episode, _mentions: &[String]) -> Result<()> {
            self.episodes.lock().unwrap().insert(episode.id.clone(), episode.clone());
            Ok(())
        }
        async fn get_episode(&self, _user: &str, id: &str) -> Result<Option<Episode>> {
            Ok(self.episodes.lock().unwrap().get(id).cloned())
        }
        async fn upsert_entity(&self, _entity: &Entity) -> Result<()> {
            Ok(())
        }
        async fn find_entity_by_name(&self, _user: &str, _name: &str) -> Result<Option<Entity>> {
            Ok(None)
        }
        async fn soft_delete(&self, _user: &str, _node_id: &str) -> Result<()> {
            Ok(())
        }
        async fn hard_delete_expired(&self, _user: &str, _grace: chrono::Duration) -> Result<u64> {
            Ok(0)
        }
        async fn vector_search(&self, _user: &str, _q: &[f32], _k: usize) -> Result<Vec<ScoredEpisode>> {
            Ok(vec![])
        }
        async fn keyword_search(&self, _user: &str, _q: &str, _k: usize) -> Result<Vec<ScoredEpisode>> {
            Ok(vec![])
        }
        async fn graph_search(&self, _user: &str, _seeds: &[String], _k: usize, _hops: u32) -> Result<Vec<ScoredEpisode>> {
            Ok(vec![])
        }
        async fn apply_decay(&self, _user: &str, _half_life: chrono::Duration) -> Result<u64> {
            Ok(0)
        }
        async fn exists_duplicate(&self, _user: &str, _hash: u64) -> Result<bool> {
            Ok(false)
        }
        async fn count_live(&self, _user: &str, _tier: Option<crate::types::Tier>) -> Result<u64> {
            Ok(self.episodes.lock().unwrap().len() as u64)
        }
        async fn list_tier(&self, _user: &str, _tier: crate::types::Tier, _limit: usize) -> Result<Vec<Episode>> {
            Ok(self.episodes.lock().unwrap().values().cloned().collect())
        }
    }

    fn config() -> ReasoningConfig {
        ReasoningConfig {
            experience_buffer_size: 3,
            min_experiences_for_strategy: 2,
            exploration_rate: 0.0,
            confidence_boost: 0.05,
            confidence_penalty: 0.10,
        }
    }

    #[tokio::test]
    async fn logging_triggers_extraction_once_buffer_full() {
        let graph = Arc::new(FakeGraph::default());
        let bank = ReasoningBank::new(graph.clone(), config());
        for i in 0..3 {
            bank.log_experience(
                "u1",
                &format!("write unit test {i}"),
                "testing",
                HashMap::new(),
                "write assert check validate",
                Outcome::Success,
                "worked",
                None,
            )
            .await
            .unwrap();
        }
        let strategies = bank.strategies_for("u1", Some("testing"), 10, false).await.unwrap();
        assert!(!strategies.is_empty());
        assert!(strategies[0].description.contains("testing"));
    }

    #[tokio::test]
    async fn update_increments_counters_and_reinforces_confidence() {
        let graph = Arc::new(FakeGraph::default());
        let bank = ReasoningBank::new(graph, config());
        let mut strategy = Strategy::new("u1", "For testing: assert validate", "testing", 0.6, false);
        let payload = serde_json::to_string(&strategy).unwrap();
        let mut episode = Episode::new("u1", payload, 0.6).unwrap();
        episode.id = strategy_episode_id(&strategy.id);
        episode.source = "strategy".to_string();
        bank.graph.upsert_episode(&episode, &[]).await.unwrap();

        let updated = bank.update("u1", &strategy.id, Outcome::Success).await.unwrap();
        assert_eq!(updated.success_count, 1);
        assert!((updated.confidence - 0.65).abs() < 1e-6);

        strategy = updated;
        let updated = bank.update("u1", &strategy.id, Outcome::Failure).await.unwrap();
        assert_eq!(updated.failure_count, 1);
        assert!(updated.confidence < strategy.confidence);
    }

    #[tokio::test]
    async fn anti_patterns_excluded_from_strategies_for_by_default() {
        let graph = Arc::new(FakeGraph::default());
        let bank = ReasoningBank::new(graph, config());
        let strategy = Strategy::new("u1", "AVOID for testing: foo", "testing", 0.1, true);
        let payload = serde_json::to_string(&strategy).unwrap();
        let mut episode = Episode::new("u1", payload, 0.1).unwrap();
        episode.id = strategy_episode_id(&strategy.id);
        episode.source = "strategy".to_string();
        bank.graph.upsert_episode(&episode, &[]).await.unwrap();

        let normal = bank.strategies_for("u1", Some("testing"), 10, false).await.unwrap();
        assert!(normal.is_empty());
        let with_anti = bank.strategies_for("u1", Some("testing"), 10, true).await.unwrap();
        assert_eq!(with_anti.len(), 1);
    }
}
