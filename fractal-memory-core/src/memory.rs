//! `FractalMemory` (§4.3): the orchestrator that wires the Volatile Store,
//! the Graph Store, the Hybrid Retriever and the Reasoning Bank into the
//! public `remember` / `recall` / `consolidate` / `garbage_collect` surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::constants::defaults;
use crate::constants::keys;
use crate::error::{Error, Result};
use crate::providers::{coerce_summary, EmbeddingProvider, SummaryInput, Summarizer};
use crate::reasoning::ReasoningBank;
use crate::retriever::HybridRetriever;
use crate::store::graph::GraphStore;
use crate::store::volatile::{LockOutcome, ReleaseOutcome, SessionRecord, VolatileStore};
use crate::types::{ConsolidationCounters, Episode, GcCounters, MemoryStats, Scale, Tier};

/// Number of live L2 episodes for a user that makes the L2→L3 abstraction
/// step (§4.3 Step 5) worth attempting. The trigger policy itself is left
/// open by the design; this is a conservative default an offline job can
/// override by calling [`FractalMemory::abstract_l3`] directly.
const L3_COHESION_THRESHOLD: usize = 20;

/// Shared state behind `FractalMemory`'s cheap `Clone`, so a `remember` call
/// can hand a handle to a spawned background consolidation tick without
/// requiring callers to wrap the whole thing in an `Arc` themselves.
struct Inner {
    volatile: Arc<dyn VolatileStore>,
    graph: Arc<dyn GraphStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    retriever: HybridRetriever,
    reasoning: ReasoningBank,
    config: Config,
    last_consolidation_at: RwLock<Option<DateTime<Utc>>>,
    l0_overflow_drops: AtomicU64,
}

/// The hierarchical memory core's public entry point. Cheap to clone: all
/// state lives behind an `Arc`.
#[derive(Clone)]
pub struct FractalMemory {
    inner: Arc<Inner>,
}

impl FractalMemory {
    /// Wires a memory instance from its four external collaborators. The
    /// embedder and summariser are optional: without an embedder the vector
    /// retrieval arm degrades to empty, and without a summariser L0→L1
    /// consolidation falls back to [`crate::providers::coerce_summary`]'s
    /// deterministic path unconditionally.
    #[must_use]
    pub fn new(
        volatile: Arc<dyn VolatileStore>,
        graph: Arc<dyn GraphStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        summarizer: Option<Arc<dyn Summarizer>>,
        config: Config,
    ) -> Self {
        let retriever = HybridRetriever::new(graph.clone(), embedder.clone(), config.retrieval_weights);
        let reasoning = ReasoningBank::new(
            graph.clone(),
            crate::reasoning::ReasoningConfig {
                experience_buffer_size: config.experience_buffer_size,
                min_experiences_for_strategy: config.min_experiences_for_strategy,
                exploration_rate: config.exploration_rate,
                confidence_boost: config.confidence_boost,
                confidence_penalty: config.confidence_penalty,
            },
        );
        Self {
            inner: Arc::new(Inner {
                volatile,
                graph,
                embedder,
                summarizer,
                retriever,
                reasoning,
                config,
                last_consolidation_at: RwLock::new(None),
                l0_overflow_drops: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[must_use]
    pub fn reasoning(&self) -> &ReasoningBank {
        &self.inner.reasoning
    }

    /// Appends `content` to `user`'s L0 log (§4.3 Step 1 predecessor). If
    /// the append pushes L0 to or past its configured capacity, spawns a
    /// detached consolidation tick rather than blocking the caller.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::Validation`] from [`Episode::new`] or
    /// [`Error::StoreUnavailable`] from the volatile store write.
    #[instrument(skip(self, content, metadata), fields(user))]
    pub async fn remember(
        &self,
        user: &str,
        content: &str,
        importance: f32,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<String> {
        let mut episode = Episode::new(user, content, importance)?;
        episode.extra = metadata;
        if let Some(embedder) = &self.inner.embedder {
            match embedder.embed(content).await {
                Ok(vector) => episode.embedding = Some(vector),
                Err(e) => warn!(error = %e, "embedding failed, storing without vector"),
            }
        }

        let id = episode.id.clone();
        let cap = self.inner.config.l0_capacity.min(defaults::L0_CAPACITY_MAX);
        let overflowed = self.inner.volatile.l0_append(user, episode, cap).await?;
        if overflowed {
            self.inner.l0_overflow_drops.fetch_add(1, Ordering::Relaxed);
        }

        let len = self.inner.volatile.l0_len(user).await?;
        if len >= cap as u64 {
            let bg = self.clone();
            let user = user.to_string();
            tokio::spawn(async move {
                match bg.consolidate(&user).await {
                    Ok(counters) => info!(?counters, "background consolidation tick completed"),
                    Err(e) => warn!(error = %e, "background consolidation tick failed"),
                }
            });
        }

        Ok(id)
    }

    /// Cascading recall across tiers (§4.3 Step "recall"). Queries L0 and L1
    /// first; if they alone already satisfy `limit`, the Hybrid Retriever's
    /// L2/L3 budget is reduced by
    /// [`defaults::LOWER_TIER_BUDGET_REDUCTION`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetrieverUnavailable`] only if every L2/L3 search
    /// arm fails; L0/L1 reads failing is treated the same way (best-effort
    /// degrade, never an error) as a retriever arm failing.
    #[instrument(skip(self, query), fields(user))]
    pub async fn recall(&self, user: &str, query: &str, limit: usize, tiers: &[Tier]) -> Result<Vec<crate::types::RecallResult>> {
        let want = |t: Tier| tiers.is_empty() || tiers.contains(&t);
        let query_lower = query.to_lowercase();

        let mut results: Vec<crate::types::RecallResult> = Vec::new();

        if want(Tier::L0) {
            let l0 = self.inner.volatile.l0_read(user, self.inner.config.l0_capacity).await.unwrap_or_default();
            results.extend(l0.into_iter().filter(|e| !e.deleted).filter_map(|e| score_episode(&e, &query_lower)));
        }
        if want(Tier::L1) {
            let l1 = self.inner.volatile.l1_list(user, usize::MAX).await.unwrap_or_default();
            results.extend(l1.into_iter().filter_map(|r| score_session(&r, &query_lower)));
        }

        let retriever_budget = if results.len() >= limit {
            ((limit as f32) * defaults::LOWER_TIER_BUDGET_REDUCTION).ceil() as usize
        } else {
            limit
        };

        if (want(Tier::L2) || want(Tier::L3)) && retriever_budget > 0 {
            match self.inner.retriever.search(user, query, retriever_budget).await {
                Ok(outcome) => {
                    if outcome.degraded {
                        warn!(user, "hybrid retriever ran in degraded mode");
                    }
                    for r in outcome.results {
                        if want(r.source) {
                            results.push(r);
                        }
                    }
                }
                Err(e) => {
                    if results.is_empty() {
                        return Err(e);
                    }
                    warn!(error = %e, "hybrid retriever failed, returning volatile-tier hits only");
                }
            }
        }

        dedup_by_episode_id(&mut results);
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.episode_id.cmp(&b.episode_id))
        });
        results.truncate(limit);

        for r in &results {
            if matches!(r.source, Tier::L2 | Tier::L3) {
                self.touch_best_effort(user, &r.episode_id).await;
            }
        }

        Ok(results)
    }

    async fn touch_best_effort(&self, user: &str, episode_id: &str) {
        if let Ok(Some(mut episode)) = self.inner.graph.get_episode(user, episode_id).await {
            episode.touch();
            let _ = self.inner.graph.upsert_episode(&episode, &[]).await;
        }
    }

    /// Runs the 4-5 step consolidation pipeline for `user` (§4.3). Acquires
    /// the per-user consolidation lock so concurrent calls are non-reentrant
    /// and return an empty [`ConsolidationCounters`] instead of racing.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::StoreUnavailable`] from any underlying store
    /// call; the lock is always released before returning, success or
    /// failure.
    #[instrument(skip(self), fields(user))]
    pub async fn consolidate(&self, user: &str) -> Result<ConsolidationCounters> {
        let lock_key = keys::consolidation_lock(user);
        let ttl = std::time::Duration::from_secs(defaults::CONSOLIDATION_LOCK_TTL_SECS);
        let token = match self.inner.volatile.lock_acquire(&lock_key, ttl).await? {
            LockOutcome::Acquired(token) => token,
            LockOutcome::Busy => {
                info!(user, "consolidation already in progress, skipping");
                return Ok(ConsolidationCounters::default());
            }
        };

        let outcome = self.consolidate_locked(user).await;

        match self.inner.volatile.lock_release(&lock_key, &token).await {
            Ok(ReleaseOutcome::Released) => {}
            Ok(ReleaseOutcome::Stale) => warn!(user, "consolidation lock already expired by the time of release"),
            Err(e) => warn!(error = %e, "failed to release consolidation lock"),
        }

        let counters = outcome?;
        *self.inner.last_consolidation_at.write().await = Some(Utc::now());
        Ok(counters)
    }

    async fn consolidate_locked(&self, user: &str) -> Result<ConsolidationCounters> {
        let mut counters = ConsolidationCounters::default();

        self.consolidate_l0_to_l1(user, &mut counters).await?;
        self.promote_l1_to_l2(user, &mut counters).await?;
        counters.decayed += self
            .inner
            .graph
            .apply_decay(user, Duration::days(self.inner.config.l1_ttl_days))
            .await?;
        self.forget_stale(user, &mut counters).await?;
        self.maybe_abstract_l3(user).await?;

        Ok(counters)
    }

    /// Step 1: batches `batch_size` oldest L0 items into an L1 summary plus
    /// a durable `conversation_summary` L2 episode, draining L0 one batch at
    /// a time until fewer than `batch_size` items remain.
    async fn consolidate_l0_to_l1(&self, user: &str, counters: &mut ConsolidationCounters) -> Result<()> {
        let batch_size = self.inner.config.batch_size;
        loop {
            let len = self.inner.volatile.l0_len(user).await?;
            if len < batch_size as u64 {
                break;
            }
            let batch = self.inner.volatile.l0_range_pop(user, batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let inputs: Vec<SummaryInput> = batch
                .iter()
                .map(|e| SummaryInput { text: e.content.clone(), importance: e.importance })
                .collect();
            let texts: Vec<String> = batch.iter().map(|e| e.content.clone()).collect();

            let raw = match &self.inner.summarizer {
                Some(s) => s.summarize(&texts).await.unwrap_or_default(),
                None => String::new(),
            };
            let batch_summary = coerce_summary(&raw, &inputs);

            let session_id = uuid::Uuid::new_v4().to_string();
            let record = SessionRecord {
                session_id: session_id.clone(),
                summary: batch_summary.summary.clone(),
                importance: batch_summary.importance,
                source_count: batch_summary.source_count,
                created_at: Utc::now(),
                extra: HashMap::new(),
            };
            self.inner.volatile.l1_put(user, record).await?;

            let mut episode = Episode::new(user, batch_summary.summary, batch_summary.importance)?;
            episode.source = "conversation_summary".to_string();
            episode.tier = Tier::L2;
            episode.scale = Scale::Meso;
            episode
                .extra
                .insert("session_id".to_string(), serde_json::Value::String(session_id));
            self.inner.graph.upsert_episode(&episode, &[]).await?;
            counters.promoted += 1;
        }
        Ok(())
    }

    /// Step 2: promotes L1 session records to durable L2 episodes. A record
    /// is promoted when either it is past `l1_ttl_days` and still above
    /// `importance_threshold`, or its importance already clears
    /// `l2_threshold` regardless of age; purely stale, low-importance
    /// sessions are left for [`Self::forget_stale`] instead. Records whose
    /// content hash already exists live in L2 are deduped away without
    /// counting as a promotion.
    async fn promote_l1_to_l2(&self, user: &str, counters: &mut ConsolidationCounters) -> Result<()> {
        let ttl = Duration::days(self.inner.config.l1_ttl_days);
        let now = Utc::now();
        let records = self.inner.volatile.l1_list(user, usize::MAX).await?;

        for record in records {
            let age = now - record.created_at;
            let eligible = record.importance >= self.inner.config.l2_threshold
                || (age >= ttl && record.importance >= self.inner.config.importance_threshold);
            if !eligible {
                continue;
            }

            let hash = content_hash(&record.summary);
            if self.inner.graph.exists_duplicate(user, hash).await? {
                self.inner.volatile.l1_delete(user, &record.session_id).await?;
                continue;
            }

            let mut episode = Episode::new(user, record.summary.clone(), record.importance)?;
            episode.source = "session_summary".to_string();
            episode.tier = Tier::L2;
            episode.scale = Scale::Meso;
            episode.extra.insert(
                "session_id".to_string(),
                serde_json::Value::String(record.session_id.clone()),
            );
            self.inner.graph.upsert_episode(&episode, &[]).await?;
            self.inner.volatile.l1_delete(user, &record.session_id).await?;
            counters.promoted += 1;
        }
        Ok(())
    }

    /// Step 4: drops L0 items that have decayed below `importance_threshold`
    /// and were never accessed, deletes stale low-importance L1 records left
    /// over from [`Self::promote_l1_to_l2`], and soft-deletes aged,
    /// low-importance, zero-access L2/L3 episodes.
    async fn forget_stale(&self, user: &str, counters: &mut ConsolidationCounters) -> Result<()> {
        let threshold = self.inner.config.importance_threshold;
        let half_life_minutes = (self.inner.config.l1_ttl_days.max(1) * 24 * 60) as f64;

        let total = self.inner.volatile.l0_len(user).await?;
        let oldest_first: Vec<Episode> = {
            let mut newest_first = self.inner.volatile.l0_read(user, total as usize).await?;
            newest_first.reverse();
            newest_first
        };
        let mut drop_count = 0usize;
        for episode in &oldest_first {
            if episode.access_count > 0 {
                break;
            }
            let age_minutes = (Utc::now() - episode.created_at).num_minutes().max(0) as f64;
            let decayed = episode.importance as f64 * (-age_minutes / half_life_minutes).exp();
            if decayed >= threshold as f64 {
                break;
            }
            drop_count += 1;
        }
        if drop_count > 0 {
            let dropped = self.inner.volatile.l0_range_pop(user, drop_count).await?;
            counters.forgotten += dropped.len() as u64;
        }

        let ttl = Duration::days(self.inner.config.l1_ttl_days);
        let now = Utc::now();
        for record in self.inner.volatile.l1_list(user, usize::MAX).await? {
            if record.importance < threshold && now - record.created_at >= ttl {
                self.inner.volatile.l1_delete(user, &record.session_id).await?;
                counters.forgotten += 1;
            }
        }

        let stale_after = Duration::days(defaults::GC_LIVE_STALE_DAYS);
        for tier in [Tier::L2, Tier::L3] {
            for episode in self.inner.graph.list_tier(user, tier, usize::MAX).await? {
                if episode.deleted {
                    continue;
                }
                if episode.importance < threshold
                    && episode.access_count == 0
                    && now - episode.created_at >= stale_after
                {
                    self.inner.graph.soft_delete(user, &episode.id).await?;
                    counters.forgotten += 1;
                }
            }
        }
        Ok(())
    }

    /// Step 5: abstractive L3 synthesis, specified for completeness (§4.3,
    /// §9 Open Question — the exact trigger policy is left to the caller).
    /// This conservative default fires once per call when a user's live L2
    /// population clears [`L3_COHESION_THRESHOLD`] and no L3 episode has
    /// been synthesised yet; an offline job wanting a different policy
    /// should call this directly instead of going through `consolidate`.
    async fn maybe_abstract_l3(&self, user: &str) -> Result<()> {
        let l2_count = self.inner.graph.count_live(user, Some(Tier::L2)).await?;
        if (l2_count as usize) < L3_COHESION_THRESHOLD {
            return Ok(());
        }
        let l3_count = self.inner.graph.count_live(user, Some(Tier::L3)).await?;
        if l3_count > 0 {
            return Ok(());
        }
        self.abstract_l3(user).await
    }

    /// Synthesises one L3 episode from the most important live L2 episodes,
    /// unconditionally. Exposed directly for callers that want to drive the
    /// L2→L3 trigger policy themselves rather than rely on
    /// [`Self::maybe_abstract_l3`]'s default.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::StoreUnavailable`] from the graph store.
    pub async fn abstract_l3(&self, user: &str) -> Result<()> {
        let mut l2 = self.inner.graph.list_tier(user, Tier::L2, usize::MAX).await?;
        l2.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));
        l2.truncate(10);
        if l2.is_empty() {
            return Ok(());
        }

        let content = l2.iter().map(|e| e.content.as_str()).collect::<Vec<_>>().join(" ");
        let importance = l2.iter().map(|e| e.importance).sum::<f32>() / l2.len() as f32;
        let mut abstraction = Episode::new(user, content, importance)?;
        abstraction.source = "abstraction".to_string();
        abstraction.tier = Tier::L3;
        abstraction.scale = Scale::Macro;
        abstraction.extra.insert(
            "constituent_ids".to_string(),
            serde_json::Value::Array(l2.iter().map(|e| serde_json::Value::String(e.id.clone())).collect()),
        );
        self.inner.graph.upsert_episode(&abstraction, &[]).await
    }

    /// Garbage collection (§4.3): first hard-deletes already soft-deleted
    /// nodes past `grace`, then sweeps remaining live episodes for
    /// low-importance, zero-access, aged-past-30-days candidates and
    /// soft-deletes them. Hard delete runs first so a single pass can
    /// reclaim space from nodes soft-deleted in an earlier run.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::StoreUnavailable`] from the graph store.
    #[instrument(skip(self), fields(user))]
    pub async fn garbage_collect(&self, user: &str, grace: Duration) -> Result<GcCounters> {
        let hard_deleted = self.inner.graph.hard_delete_expired(user, grace).await?;

        let threshold = self.inner.config.importance_threshold;
        let stale_after = Duration::days(defaults::GC_LIVE_STALE_DAYS);
        let now = Utc::now();
        let mut soft_deleted = 0u64;
        for tier in [Tier::L2, Tier::L3] {
            for episode in self.inner.graph.list_tier(user, tier, usize::MAX).await? {
                if episode.deleted {
                    continue;
                }
                if episode.importance < threshold
                    && episode.access_count == 0
                    && now - episode.created_at >= stale_after
                {
                    self.inner.graph.soft_delete(user, &episode.id).await?;
                    soft_deleted += 1;
                }
            }
        }

        Ok(GcCounters { soft_deleted, hard_deleted })
    }

    /// Per-tier counts plus the last consolidation timestamp.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::StoreUnavailable`] from either store.
    pub async fn get_stats(&self, user: &str) -> Result<MemoryStats> {
        let l0_size = self.inner.volatile.l0_len(user).await?;
        let l1_size = self.inner.volatile.l1_len(user).await?;
        let l2_size = self.inner.graph.count_live(user, Some(Tier::L2)).await?;
        let l3_size = self.inner.graph.count_live(user, Some(Tier::L3)).await?;
        let last_consolidation_at = *self.inner.last_consolidation_at.read().await;
        Ok(MemoryStats { l0_size, l1_size, l2_size, l3_size, last_consolidation_at })
    }

    /// Lists live episodes at `tier` for `user`, newest first, bounded to
    /// `limit`. Used by the dump-by-level surface (§6.1 `GET /memory/{level}`);
    /// routes to the Volatile Store for L0/L1 and the Graph Store for L2/L3.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::StoreUnavailable`] from whichever store backs `tier`.
    pub async fn list_tier(&self, user: &str, tier: Tier, limit: usize) -> Result<Vec<Episode>> {
        match tier {
            Tier::L0 => self.inner.volatile.l0_read(user, limit).await,
            Tier::L1 => {
                let records = self.inner.volatile.l1_list(user, limit).await?;
                let mut episodes = Vec::with_capacity(records.len());
                for r in records {
                    let content = if r.summary.trim().is_empty() { "(empty session summary)".to_string() } else { r.summary };
                    let mut episode = Episode::new(user, content, r.importance)?;
                    episode.tier = Tier::L1;
                    episode.source = "session_summary".to_string();
                    episode.created_at = r.created_at;
                    episode.extra = r.extra;
                    episodes.push(episode);
                }
                Ok(episodes)
            }
            Tier::L2 | Tier::L3 => self.inner.graph.list_tier(user, tier, limit).await,
        }
    }

    /// Number of L0 appends that overflowed the configured capacity since
    /// this handle was constructed, exposed for the backpressure
    /// observability §5 calls for.
    #[must_use]
    pub fn l0_overflow_drops(&self) -> u64 {
        self.inner.l0_overflow_drops.load(Ordering::Relaxed)
    }

    /// No-op at this layer: `FractalMemory` borrows its stores rather than
    /// owning them (§9 Design Notes — singleton store clients passed by
    /// reference), so adapter shutdown is the owning Agent Facade's
    /// responsibility (§4.6).
    pub async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn content_hash(content: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

fn recency_kernel(created_at: DateTime<Utc>) -> f32 {
    let age_hours = (Utc::now() - created_at).num_minutes().max(0) as f32 / 60.0;
    (-age_hours / (24.0 * 7.0)).exp()
}

fn score_episode(episode: &Episode, query_lower: &str) -> Option<crate::types::RecallResult> {
    if !episode.content.to_lowercase().contains(query_lower) {
        return None;
    }
    Some(crate::types::RecallResult {
        episode_id: episode.id.clone(),
        content: episode.content.clone(),
        score: episode.importance * recency_kernel(episode.created_at),
        source: Tier::L0,
        created_at: episode.created_at,
        metadata: episode.extra.clone(),
    })
}

fn score_session(record: &SessionRecord, query_lower: &str) -> Option<crate::types::RecallResult> {
    if !record.summary.to_lowercase().contains(query_lower) {
        return None;
    }
    Some(crate::types::RecallResult {
        episode_id: record.session_id.clone(),
        content: record.summary.clone(),
        score: record.importance * recency_kernel(record.created_at),
        source: Tier::L1,
        created_at: record.created_at,
        metadata: record.extra.clone(),
    })
}

fn dedup_by_episode_id(results: &mut Vec<crate::types::RecallResult>) {
    let mut seen = std::collections::HashSet::new();
    results.retain(|r| seen.insert(r.episode_id.clone()));
}
