//! Hybrid Retriever (§4.4): fans out vector, keyword, and graph search
//! arms against the Graph Store, fuses them by reciprocal-rank, and masks
//! individual arm failures behind a `degraded` flag.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::config::RetrievalWeights;
use crate::constants::defaults::RRF_K;
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::store::graph::{GraphStore, ScoredEpisode};
use crate::types::{RecallResult, Tier};

/// Result of [`HybridRetriever::search`]: the fused ranking plus whether
/// any arm failed along the way.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<RecallResult>,
    pub degraded: bool,
}

/// Translates a natural-language query into a fused ranked list, consuming
/// only [`GraphStore`] primitives plus an optional [`EmbeddingProvider`].
pub struct HybridRetriever {
    graph: Arc<dyn GraphStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    weights: RetrievalWeights,
}

impl HybridRetriever {
    #[must_use]
    pub fn new(graph: Arc<dyn GraphStore>, embedder: Option<Arc<dyn EmbeddingProvider>>, weights: RetrievalWeights) -> Self {
        Self { graph, embedder, weights }
    }

    /// Runs the three-arm fan-out, fuses with reciprocal-rank, drops
    /// soft-deleted episodes, and returns the top `limit` results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetrieverUnavailable`] only if every arm fails.
    #[instrument(skip(self), fields(user))]
    pub async fn search(&self, user: &str, query: &str, limit: usize) -> Result<SearchOutcome> {
        let k_arm = limit.saturating_mul(3).max(1);

        let vector_fut = self.vector_arm(user, query, k_arm);
        let keyword_fut = self.keyword_arm(user, query, k_arm);
        let graph_fut = self.graph_arm(user, query, k_arm);

        let (vector_res, keyword_res, graph_res) = tokio::join!(vector_fut, keyword_fut, graph_fut);

        let mut degraded = false;
        let vector_hits = unwrap_arm(vector_res, "vector", &mut degraded);
        let keyword_hits = unwrap_arm(keyword_res, "keyword", &mut degraded);
        let graph_hits = unwrap_arm(graph_res, "graph", &mut degraded);

        if vector_hits.is_none() && keyword_hits.is_none() && graph_hits.is_none() {
            return Err(Error::RetrieverUnavailable("all retrieval arms failed".into()));
        }

        let fused = self.fuse(
            vector_hits.unwrap_or_default(),
            keyword_hits.unwrap_or_default(),
            graph_hits.unwrap_or_default(),
        );

        let mut results = Vec::with_capacity(fused.len());
        for (episode_id, score) in fused {
            if let Some(episode) = self.graph.get_episode(user, &episode_id).await? {
                if episode.deleted {
                    continue;
                }
                results.push(RecallResult {
                    episode_id: episode.id.clone(),
                    content: episode.content.clone(),
                    score,
                    source: episode.tier,
                    created_at: episode.created_at,
                    metadata: episode.extra.clone(),
                });
            }
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.episode_id.cmp(&b.episode_id))
        });
        results.truncate(limit);

        Ok(SearchOutcome { results, degraded })
    }

    async fn vector_arm(&self, user: &str, query: &str, k: usize) -> Result<Vec<ScoredEpisode>> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        let embedding = embedder.embed(query).await?;
        self.graph.vector_search(user, &embedding, k).await
    }

    async fn keyword_arm(&self, user: &str, query: &str, k: usize) -> Result<Vec<ScoredEpisode>> {
        self.graph.keyword_search(user, query, k).await
    }

    async fn graph_arm(&self, user: &str, query: &str, k: usize) -> Result<Vec<ScoredEpisode>> {
        let seeds = extract_seed_entities(query);
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        self.graph.graph_search(user, &seeds, k, 2).await
    }

    /// Reciprocal-rank fusion across the three arms (§4.4 step 3).
    fn fuse(
        &self,
        vector: Vec<ScoredEpisode>,
        keyword: Vec<ScoredEpisode>,
        graph: Vec<ScoredEpisode>,
    ) -> Vec<(String, f32)> {
        let mut scores: HashMap<String, f32> = HashMap::new();
        for (arm, weight) in [
            (&vector, self.weights.vector),
            (&keyword, self.weights.keyword),
            (&graph, self.weights.graph),
        ] {
            for (rank, hit) in arm.iter().enumerate() {
                let contribution = weight / (RRF_K + rank as f32 + 1.0);
                *scores.entry(hit.episode_id.clone()).or_insert(0.0) += contribution;
            }
        }
        let mut out: Vec<(String, f32)> = scores.into_iter().collect();
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        out
    }
}

fn unwrap_arm(res: Result<Vec<ScoredEpisode>>, arm: &str, degraded: &mut bool) -> Option<Vec<ScoredEpisode>> {
    match res {
        Ok(hits) => Some(hits),
        Err(e) => {
            warn!(arm, error = %e, "retrieval arm failed, continuing degraded");
            *degraded = true;
            None
        }
    }
}

/// Trivial exact-alias entity extraction (§9 Open Question): splits on
/// whitespace and keeps capitalized tokens as candidate entity names. The
/// fusion step is what masks this arm's weakness, per §4.4.
#[must_use]
pub fn extract_seed_entities(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::types::{Episode, Entity};

    struct FakeGraph {
        episodes: Mutex<HashMap<String, Episode>>,
        vector: Vec<ScoredEpisode>,
        keyword: Vec<ScoredEpisode>,
        graph_hits: Vec<ScoredEpisode>,
        fail_vector: bool,
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
            if self.fail_vector {
                return Err(Error::StoreUnavailable("vector index down".into()));
            }
            Ok(self.vector.clone())
        }
        async fn keyword_search(&self, _user: &str, _q: &str, _k: usize) -> Result<Vec<ScoredEpisode>> {
            Ok(self.keyword.clone())
        }
        async fn graph_search(&self, _user: &str, _seeds: &[String], _k: usize, _hops: u32) -> Result<Vec<ScoredEpisode>> {
            Ok(self.graph_hits.clone())
        }
        async fn apply_decay(&self, _user: &str, _half_life: chrono::Duration) -> Result<u64> {
            Ok(0)
        }
        async fn exists_duplicate(&self, _user: &str, _hash: u64) -> Result<bool> {
            Ok(false)
        }
        async fn count_live(&self, _user: &str, _tier: Option<Tier>) -> Result<u64> {
            Ok(self.episodes.lock().unwrap().len() as u64)
        }
        async fn list_tier(&self, _user: &str, _tier: Tier, _limit: usize) -> Result<Vec<Episode>> {
            Ok(self.episodes.lock().unwrap().values().cloned().collect())
        }
    }

    fn mk_episode(id: &str) -> Episode {
        let mut e = Episode::new("u1", "Python typing is great", 0.8).unwrap();
        e.id = id.to_string();
        e.tier = Tier::L2;
        e
    }

    #[tokio::test]
    async fn fuses_all_three_arms() {
        let mut episodes = HashMap::new();
        episodes.insert("e1".to_string(), mk_episode("e1"));
        episodes.insert("e2".to_string(), mk_episode("e2"));
        episodes.insert("e3".to_string(), mk_episode("e3"));

        let graph = Arc::new(FakeGraph {
            episodes: Mutex::new(episodes),
            vector: vec![ScoredEpisode { episode_id: "e2".into(), score: 0.95 }],
            keyword: vec![ScoredEpisode { episode_id: "e1".into(), score: 5.0 }],
            graph_hits: vec![ScoredEpisode { episode_id: "e3".into(), score: 0.5 }],
            fail_vector: false,
        });
        let retriever = HybridRetriever::new(graph, None, RetrievalWeights::default());
        let outcome = retriever.search("u1", "Python typing", 3).await.unwrap();
        assert!(!outcome.degraded);
        let ids: Vec<_> = outcome.results.iter().map(|r| r.episode_id.clone()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"e1".to_string()));
        assert!(ids.contains(&"e2".to_string()));
        assert!(ids.contains(&"e3".to_string()));
    }

    #[tokio::test]
    async fn degraded_when_one_arm_fails_but_others_survive() {
        let mut episodes = HashMap::new();
        episodes.insert("e1".to_string(), mk_episode("e1"));
        episodes.insert("e3".to_string(), mk_episode("e3"));

        let graph = Arc::new(FakeGraph {
            episodes: Mutex::new(episodes),
            vector: vec![],
            keyword: vec![ScoredEpisode { episode_id: "e1".into(), score: 5.0 }],
            graph_hits: vec![ScoredEpisode { episode_id: "e3".into(), score: 0.5 }],
            fail_vector: true,
        });
        let retriever = HybridRetriever::new(
            graph,
            Some(Arc::new(AlwaysFailsEmbedder)),
            RetrievalWeights::default(),
        );
        let outcome = retriever.search("u1", "Python typing", 3).await.unwrap();
        assert!(outcome.degraded);
        assert_eq!(outcome.results.len(), 2);
    }

    struct AlwaysFailsEmbedder;
    #[async_trait]
    impl EmbeddingProvider for AlwaysFailsEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::StoreUnavailable("embedder down".into()))
        }
        fn dimensions(&self) -> usize {
            8
        }
    }

    #[tokio::test]
    async fn drops_soft_deleted_episodes() {
        let mut deleted = mk_episode("e1");
        deleted.deleted = true;
        let mut episodes = HashMap::new();
        episodes.insert("e1".to_string(), deleted);

        let graph = Arc::new(FakeGraph {
            episodes: Mutex::new(episodes),
            vector: vec![],
            keyword: vec![ScoredEpisode { episode_id: "e1".into(), score: 5.0 }],
            graph_hits: vec![],
            fail_vector: false,
        });
        let retriever = HybridRetriever::new(graph, None, RetrievalWeights::default());
        let outcome = retriever.search("u1", "python", 3).await.unwrap();
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn seed_extraction_keeps_capitalized_tokens() {
        let seeds = extract_seed_entities("tell me about Python typing");
        assert_eq!(seeds, vec!["Python".to_string()]);
    }
}
