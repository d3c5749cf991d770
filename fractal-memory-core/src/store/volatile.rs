//! Volatile Store contract (§4.1): a per-user append-only log (L0) with a
//! bounded cap, a per-user keyed map of session summaries (L1), and an
//! atomic "acquire with TTL / release" lock primitive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Episode;

/// A synthesised L1 session record. Fields beyond the named ones are
/// preserved verbatim on read (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub summary: String,
    pub importance: f32,
    pub source_count: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

/// Outcome of [`VolatileStore::lock_acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired(String),
    Busy,
}

/// Outcome of [`VolatileStore::lock_release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    Stale,
}

/// The L0/L1 volatile storage contract.
///
/// All operations are whole successes or whole failures; no partial writes
/// are ever observable to a concurrent reader (§4.1 Guarantees).
#[async_trait]
pub trait VolatileStore: Send + Sync {
    /// Appends `episode` to `user`'s L0 log, truncating the oldest entries
    /// beyond `cap` (`cap` must be `<= 10_000`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::StoreUnavailable`] after exhausting
    /// the retry budget on a transient I/O failure.
    async fn l0_append(&self, user: &str, episode: Episode, cap: usize) -> Result<bool>;

    /// Reads up to `n` most-recent L0 episodes for `user`, newest first.
    /// Non-destructive.
    async fn l0_read(&self, user: &str, n: usize) -> Result<Vec<Episode>>;

    /// Atomically removes and returns the oldest `k` L0 episodes for `user`.
    /// The sole way the consolidator drains L0.
    async fn l0_range_pop(&self, user: &str, k: usize) -> Result<Vec<Episode>>;

    /// Current L0 length for `user`.
    async fn l0_len(&self, user: &str) -> Result<u64>;

    /// Upserts an L1 session record for `user`.
    async fn l1_put(&self, user: &str, record: SessionRecord) -> Result<()>;

    /// Lists up to `limit` L1 records for `user`, newest first.
    async fn l1_list(&self, user: &str, limit: usize) -> Result<Vec<SessionRecord>>;

    /// Deletes an L1 record by session id.
    async fn l1_delete(&self, user: &str, session_id: &str) -> Result<()>;

    /// Current L1 length for `user`.
    async fn l1_len(&self, user: &str) -> Result<u64>;

    /// Acquires a TTL'd lock for `key`, or returns [`LockOutcome::Busy`] if
    /// already held and unexpired.
    async fn lock_acquire(&self, key: &str, ttl: std::time::Duration) -> Result<LockOutcome>;

    /// Releases a lock previously acquired with `token`. Returns
    /// [`ReleaseOutcome::Stale`] if the token no longer matches (already
    /// expired and re-acquired by someone else).
    async fn lock_release(&self, key: &str, token: &str) -> Result<ReleaseOutcome>;
}
