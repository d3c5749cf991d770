//! End-to-end scenario tests against the real redb + turso stores, wired
//! together the same way `fractal-memory-cli`'s commands do.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;

use fractal_memory_core::store::{GraphStore, VolatileStore};
use fractal_memory_core::types::Tier;
use fractal_memory_core::{Config, FractalMemory};
use fractal_memory_graph_turso::TursoGraphStore;
use fractal_memory_volatile_redb::RedbVolatileStore;

async fn memory_with_config(config: Config) -> (FractalMemory, Arc<TursoGraphStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let volatile = RedbVolatileStore::open(&dir.path().join("volatile.redb")).await.unwrap();
    let graph = Arc::new(TursoGraphStore::open_memory().await.unwrap());
    let memory = FractalMemory::new(
        Arc::new(volatile) as Arc<dyn VolatileStore>,
        graph.clone() as Arc<dyn GraphStore>,
        None,
        None,
        config,
    );
    (memory, graph, dir)
}

/// S1 — batch_size=3, l2_threshold=0: three messages consolidate straight
/// through L1 into a single L2 episode. With the threshold this low the
/// freshly written L1 session is itself immediately eligible for the
/// second promotion pass; it finds its own summary already duplicated in
/// L2 and is deleted rather than re-promoted, so L1 ends up empty too.
#[tokio::test]
async fn s1_batch_promotion() {
    let config = Config { batch_size: 3, l2_threshold: 0.0, ..Config::default() };
    let (memory, _graph, _dir) = memory_with_config(config).await;

    for text in ["alpha", "beta", "gamma"] {
        memory.remember("u1", text, 0.9, HashMap::new()).await.unwrap();
    }

    let counters = memory.consolidate("u1").await.unwrap();
    assert_eq!(counters.promoted, 1);

    let stats = memory.get_stats("u1").await.unwrap();
    assert_eq!(stats.l0_size, 0);
    assert_eq!(stats.l1_size, 0);
    assert_eq!(stats.l2_size, 1);
    assert!(stats.last_consolidation_at.is_some());

    let l2 = memory.list_tier("u1", Tier::L2, 10).await.unwrap();
    assert_eq!(l2.len(), 1);
    assert_eq!(l2[0].source, "conversation_summary");
}

/// S2 — a low-importance, stale entry is forgotten rather than promoted.
#[tokio::test]
async fn s2_decay_then_forget() {
    let config = Config { importance_threshold: 0.3, ..Config::default() };
    let (memory, _graph, _dir) = memory_with_config(config).await;

    memory.remember("u1", "old thought", 0.2, HashMap::new()).await.unwrap();

    let counters = memory.consolidate("u1").await.unwrap();
    assert_eq!(counters.promoted, 0);
    assert_eq!(counters.forgotten, 1);

    let stats = memory.get_stats("u1").await.unwrap();
    assert_eq!(stats.l0_size, 0);
}

/// S3 — two users sharing the same stores never see each other's content.
#[tokio::test]
async fn s3_user_isolation() {
    let (memory, _graph, _dir) = memory_with_config(Config::default()).await;

    memory.remember("alice", "alice_secret_42", 0.9, HashMap::new()).await.unwrap();
    let bob_results = memory.recall("bob", "alice_secret_42", 5, &[]).await.unwrap();

    assert!(bob_results.is_empty());
}

/// S5 — two concurrent consolidate calls for the same user: one does the
/// work, the other observes the held lock and returns zero counters.
#[tokio::test]
async fn s5_non_reentrant_consolidate() {
    let config = Config { batch_size: 1, l2_threshold: 0.0, ..Config::default() };
    let (memory, _graph, _dir) = memory_with_config(config).await;
    memory.remember("u1", "only message", 0.9, HashMap::new()).await.unwrap();

    let a = memory.clone();
    let b = memory.clone();
    let (first, second) = tokio::join!(
        async move { a.consolidate("u1").await.unwrap() },
        async move { b.consolidate("u1").await.unwrap() },
    );

    let zero_counters = |c: &fractal_memory_core::types::ConsolidationCounters| {
        c.promoted == 0 && c.decayed == 0 && c.forgotten == 0
    };
    assert!(zero_counters(&first) || zero_counters(&second));
}

/// S6 — a soft-deleted episode is only hard-deleted once the grace period
/// has elapsed. The post-grace half of this scenario (hard-deleted >= 1
/// once the deadline passes) is covered at the store level by
/// `fractal-memory-graph-turso`'s `soft_delete_then_hard_delete_expired_removes_row`.
#[tokio::test]
async fn s6_gc_respects_grace() {
    let (memory, graph, _dir) = memory_with_config(Config::default()).await;

    let mut episode = fractal_memory_core::types::Episode::new("u1", "to be forgotten", 0.9).unwrap();
    episode.tier = Tier::L2;
    graph.upsert_episode(&episode, &[]).await.unwrap();
    graph.soft_delete("u1", &episode.id).await.unwrap();

    let too_soon = memory.garbage_collect("u1", Duration::days(7)).await.unwrap();
    assert_eq!(too_soon.hard_deleted, 0);
}
