//! The Agent Facade (§4.6): composes [`FractalMemory`] (which already bundles
//! the Hybrid Retriever and Reasoning Bank, per its own construction) with a
//! completion provider, tracks which of them this facade constructed versus
//! received pre-built, and exposes the per-turn fast path plus a background
//! slow-path supervisor. [`http`] is a thin translation shim over it with no
//! retrieval or consolidation logic of its own.

pub mod completion;
pub mod heuristic;
pub mod http;
mod prompt;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use fractal_memory_core::error::{Error, Result};
use fractal_memory_core::providers::{CompletionProvider, EmbeddingProvider, Summarizer};
use fractal_memory_core::store::{GraphStore, VolatileStore};
use fractal_memory_core::types::Tier;
use fractal_memory_core::{Config, FractalMemory};

use completion::EchoCompletionProvider;

/// Upper bound on how long the fast path waits for the completion provider.
const PER_TURN_TIMEOUT: Duration = Duration::from_secs(30);

/// Daily garbage-collection tick, independent of `consolidation_interval_seconds`.
const GC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Grace period before a soft-deleted node is eligible for hard deletion.
const GC_GRACE: chrono::Duration = chrono::Duration::days(7);

/// Response of [`AgentFacade::process_turn`] (§6.1 `POST /chat`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub response: String,
    pub context_count: usize,
    pub strategies_used: Vec<String>,
    pub processing_time_ms: u64,
}

/// Composes the memory core with a completion provider for one user.
///
/// `FractalMemory` already composes the Volatile Store, Graph Store, Hybrid
/// Retriever, and Reasoning Bank (its own construction bundles all three per
/// §4.3–§4.5), so this facade's "pre-built memory / retriever / reasoning
/// bank" injection point (§4.6) collapses to a single pre-built
/// `FractalMemory` plus a pre-built completion provider.
pub struct AgentFacade {
    memory: FractalMemory,
    completion: Arc<dyn CompletionProvider>,
    owns_memory: bool,
}

impl AgentFacade {
    /// Builds a facade from individual collaborators, constructing a
    /// `FractalMemory` internally when `memory` is `None`.
    #[must_use]
    pub fn new(
        config: Config,
        volatile: Arc<dyn VolatileStore>,
        graph: Arc<dyn GraphStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        summarizer: Option<Arc<dyn Summarizer>>,
        completion: Option<Arc<dyn CompletionProvider>>,
        memory: Option<FractalMemory>,
    ) -> Self {
        let owns_memory = memory.is_none();
        let memory = memory.unwrap_or_else(|| FractalMemory::new(volatile, graph, embedder, summarizer, config));
        let completion = completion.unwrap_or_else(|| Arc::new(EchoCompletionProvider));
        Self { memory, completion, owns_memory }
    }

    /// Builds a facade from an arbitrary configuration payload (§6.4): known
    /// keys are honored, unknown keys are preserved as no-ops.
    #[must_use]
    pub fn from_payload(
        payload: &HashMap<String, serde_json::Value>,
        volatile: Arc<dyn VolatileStore>,
        graph: Arc<dyn GraphStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        summarizer: Option<Arc<dyn Summarizer>>,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        let config = Config::from_payload(payload);
        Self::new(config, volatile, graph, embedder, summarizer, completion, None)
    }

    #[must_use]
    pub fn memory(&self) -> &FractalMemory {
        &self.memory
    }

    /// The per-turn fast path (§4.6): remember, recall, optionally fetch
    /// strategies, complete, remember the reply.
    #[instrument(skip(self, message))]
    pub async fn process_turn(&self, user: &str, message: &str) -> Result<TurnResponse> {
        let started = Instant::now();
        let config = self.memory.config().clone();

        self.memory.remember(user, message, 1.0, HashMap::new()).await?;

        let tiers = [Tier::L0, Tier::L1, Tier::L2, Tier::L3];
        let recalled = self.memory.recall(user, message, config.retrieval_limit, &tiers).await?;

        let strategies = if heuristic::looks_like_task(message) {
            self.memory.reasoning().strategies_for(user, None, 2, false).await.unwrap_or_default()
        } else {
            Vec::new()
        };

        let prompt_text = prompt::build_prompt(message, &recalled, &strategies);

        let response_text = match tokio::time::timeout(PER_TURN_TIMEOUT, self.completion.complete(&prompt_text)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(Error::Cancelled),
        };

        self.memory.remember(user, &response_text, 0.5, HashMap::new()).await?;

        Ok(TurnResponse {
            response: response_text,
            context_count: recalled.len(),
            strategies_used: strategies.into_iter().map(|s| s.description).collect(),
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Runs the background slow path until `shutdown` is cancelled: a
    /// `consolidate` tick every `consolidation_interval_seconds`, and a daily
    /// `garbage_collect` tick, both for `user`.
    pub async fn run_background(self: Arc<Self>, user: String, shutdown: CancellationToken) {
        let interval = Duration::from_secs(self.memory.config().consolidation_interval_seconds.max(1));
        let consolidate_facade = Arc::clone(&self);
        let consolidate_user = user.clone();
        let consolidate_shutdown = shutdown.clone();
        let consolidate_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = consolidate_shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match consolidate_facade.memory.consolidate(&consolidate_user).await {
                            Ok(counters) => info!(?counters, "background consolidation tick"),
                            Err(e) => warn!(error = %e, "background consolidation tick failed"),
                        }
                    }
                }
            }
        });

        let gc_facade = self;
        let gc_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GC_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match gc_facade.memory.garbage_collect(&user, GC_GRACE).await {
                            Ok(counters) => info!(?counters, "background gc tick"),
                            Err(e) => warn!(error = %e, "background gc tick failed"),
                        }
                    }
                }
            }
        });

        let _ = tokio::join!(consolidate_task, gc_task);
    }

    /// Releases owned collaborators only; a borrowed `FractalMemory` is left
    /// untouched (§4.6 ownership tracking).
    pub async fn close(&self) -> Result<()> {
        if self.owns_memory {
            self.memory.close().await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fractal_memory_core::store::graph::ScoredEpisode;
    use fractal_memory_core::store::volatile::{LockOutcome, ReleaseOutcome, SessionRecord};
    use fractal_memory_core::types::{Entity, Episode};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeVolatile {
        l0: StdMutex<HashMap<String, Vec<Episode>>>,
    }

    #[async_trait]
    impl VolatileStore for FakeVolatile {
        async fn l0_append(&self, user: &str, episode: Episode, cap: usize) -> Result<bool> {
            let mut guard = self.l0.lock().unwrap();
            let entry = guard.entry(user.to_string()).or_default();
            entry.push(episode);
            let overflowed = entry.len() > cap;
            if overflowed {
                entry.remove(0);
            }
            Ok(overflowed)
        }
        async fn l0_read(&self, user: &str, n: usize) -> Result<Vec<Episode>> {
            let guard = self.l0.lock().unwrap();
            let entry = guard.get(user).cloned().unwrap_or_default();
            Ok(entry.into_iter().rev().take(n).collect())
        }
        async fn l0_range_pop(&self, user: &str, k: usize) -> Result<Vec<Episode>> {
            let mut guard = self.l0.lock().unwrap();
            let entry = guard.entry(user.to_string()).or_default();
            let take = k.min(entry.len());
            Ok(entry.drain(0..take).collect())
        }
        async fn l0_len(&self, user: &str) -> Result<u64> {
            Ok(self.l0.lock().unwrap().get(user).map_or(0, Vec::len) as u64)
        }
        async fn l1_put(&self, _user: &str, _record: SessionRecord) -> Result<()> {
            Ok(())
        }
        async fn l1_list(&self, _user: &str, _limit: usize) -> Result<Vec<SessionRecord>> {
            Ok(Vec::new())
        }
        async fn l1_delete(&self, _user: &str, _session_id: &str) -> Result<()> {
            Ok(())
        }
        async fn l1_len(&self, _user: &str) -> Result<u64> {
            Ok(0)
        }
        async fn lock_acquire(&self, _key: &str, _ttl: std::time::Duration) -> Result<LockOutcome> {
            Ok(LockOutcome::Acquired("token".into()))
        }
        async fn lock_release(&self, _key: &str, _token: &str) -> Result<ReleaseOutcome> {
            Ok(ReleaseOutcome::Released)
        }
    }

    #[derive(Default)]
    struct FakeGraph;

    #[async_trait]
    impl GraphStore for FakeGraph {
        async fn upsert_episode(&self, _episode: &Episode, _mentions: &[String]) -> Result<()> {
            Ok(())
        }
        async fn get_episode(&self, _user: &str, _id: &str) -> Result<Option<Episode>> {
            Ok(None)
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
            Ok(Vec::new())
        }
        async fn keyword_search(&self, _user: &str, _q: &str, _k: usize) -> Result<Vec<ScoredEpisode>> {
            Ok(Vec::new())
        }
        async fn graph_search(
            &self,
            _user: &str,
            _seeds: &[String],
            _k: usize,
            _hops: u32,
        ) -> Result<Vec<ScoredEpisode>> {
            Ok(Vec::new())
        }
        async fn apply_decay(&self, _user: &str, _half_life: chrono::Duration) -> Result<u64> {
            Ok(0)
        }
        async fn exists_duplicate(&self, _user: &str, _content_hash: u64) -> Result<bool> {
            Ok(false)
        }
        async fn count_live(&self, _user: &str, _tier: Option<Tier>) -> Result<u64> {
            Ok(0)
        }
        async fn list_tier(&self, _user: &str, _tier: Tier, _limit: usize) -> Result<Vec<Episode>> {
            Ok(Vec::new())
        }
    }

    fn facade() -> AgentFacade {
        AgentFacade::new(
            Config::default(),
            Arc::new(FakeVolatile::default()),
            Arc::new(FakeGraph),
            None,
            None,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn process_turn_remembers_and_replies() {
        let facade = facade();
        let response = facade.process_turn("u1", "hello there").await.unwrap();
        assert!(response.response.contains("hello there"));
        assert_eq!(facade.memory.l0_overflow_drops(), 0);
    }

    #[tokio::test]
    async fn task_like_turn_requests_strategies_without_erroring() {
        let facade = facade();
        let response = facade.process_turn("u1", "can you fix this bug").await.unwrap();
        assert!(response.strategies_used.is_empty());
    }

    #[tokio::test]
    async fn close_is_a_noop_for_a_borrowed_memory() {
        let memory = FractalMemory::new(
            Arc::new(FakeVolatile::default()),
            Arc::new(FakeGraph),
            None,
            None,
            Config::default(),
        );
        let facade = AgentFacade::new(
            Config::default(),
            Arc::new(FakeVolatile::default()),
            Arc::new(FakeGraph),
            None,
            None,
            None,
            Some(memory),
        );
        assert!(!facade.owns_memory);
        facade.close().await.unwrap();
    }
}
