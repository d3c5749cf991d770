//! Graph Store contract (§4.2): durable episode/entity persistence plus the
//! three hybrid search primitives. The underlying graph database (§1) is an
//! external collaborator; implementations only need to honor this contract
//! and the required indexes it implies.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Entity, Episode};

/// A single scored hit from one of the three search primitives.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEpisode {
    pub episode_id: String,
    pub score: f32,
}

/// The L2/L3 durable graph storage contract.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Creates or updates `episode` by identifier, adding a MENTIONS edge
    /// for every id in `mentions`.
    async fn upsert_episode(&self, episode: &Episode, mentions: &[String]) -> Result<()>;

    /// Fetches a single episode by id, regardless of `deleted` state.
    async fn get_episode(&self, user: &str, id: &str) -> Result<Option<Episode>>;

    /// Creates or updates `entity` by identifier.
    async fn upsert_entity(&self, entity: &Entity) -> Result<()>;

    /// Looks up an entity by exact name for `user` (used for alias-based
    /// entity-seed extraction, §9 Open Question).
    async fn find_entity_by_name(&self, user: &str, name: &str) -> Result<Option<Entity>>;

    /// Marks `node_id` as `deleted = true, deleted_at = now`.
    async fn soft_delete(&self, user: &str, node_id: &str) -> Result<()>;

    /// Physically removes nodes with `deleted = true` and `deleted_at`
    /// older than `grace`, bounded to a batch per call. Returns the count
    /// removed.
    async fn hard_delete_expired(&self, user: &str, grace: chrono::Duration) -> Result<u64>;

    /// Cosine-similarity vector search over live episodes for `user`.
    async fn vector_search(&self, user: &str, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredEpisode>>;

    /// BM25-style full-text search over `(content, summary)` for `user`.
    async fn keyword_search(&self, user: &str, query_text: &str, k: usize) -> Result<Vec<ScoredEpisode>>;

    /// Bounded-hop graph traversal from `seed_entities`, score decaying
    /// with hop distance, ties broken by recency.
    async fn graph_search(
        &self,
        user: &str,
        seed_entities: &[String],
        k: usize,
        max_hops: u32,
    ) -> Result<Vec<ScoredEpisode>>;

    /// Multiplicatively decays importance of live episodes for `user` whose
    /// `last_accessed` is older than `half_life`'s staleness threshold.
    async fn apply_decay(&self, user: &str, half_life: chrono::Duration) -> Result<u64>;

    /// Whether a live episode for `user` already has this content hash
    /// (§3.3 invariant 7 — content addressability / dedup).
    async fn exists_duplicate(&self, user: &str, content_hash: u64) -> Result<bool>;

    /// Live (non-deleted) episode count for `user`, optionally filtered by
    /// tier.
    async fn count_live(&self, user: &str, tier: Option<crate::types::Tier>) -> Result<u64>;

    /// Lists live episodes for `user` at the given tier, newest first,
    /// bounded to `limit`.
    async fn list_tier(&self, user: &str, tier: crate::types::Tier, limit: usize) -> Result<Vec<Episode>>;
}
