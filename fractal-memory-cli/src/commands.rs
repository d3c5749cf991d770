//! The four operational commands of §6.5, plus `serve` which is not part of
//! the "operational minimum" list but is the CLI's entry point for running
//! the chat HTTP surface.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fractal_memory_agent::http;
use fractal_memory_agent::AgentFacade;
use fractal_memory_core::error::{Error, Result};
use fractal_memory_core::{Config, FractalMemory};

use crate::stores::{as_trait_objects, open_graph, open_volatile};

/// A probe user id, distinct from real tenant ids, used by `smoke-test` so
/// it never pollutes a real user's memory.
const SMOKE_TEST_USER: &str = "__smoke_test__";

pub async fn migrate(config: &Config) -> Result<()> {
    let graph = open_graph(config).await?;
    let applied = graph.apply_pending_migrations().await?;
    for migration in &applied {
        info!(version = migration.version, name = %migration.name, applied_at = %migration.applied_at, "migration applied");
    }
    println!(
        "{}",
        json!({ "status": "ok", "migrations": applied.iter().map(|m| json!({
            "version": m.version, "name": m.name, "applied_at": m.applied_at,
        })).collect::<Vec<_>>() })
    );
    Ok(())
}

pub async fn smoke_test(config: &Config) -> Result<()> {
    let volatile = open_volatile(config).await?;
    let graph = open_graph(config).await?;
    let (volatile, graph) = as_trait_objects(&volatile, &graph);
    let memory = FractalMemory::new(volatile, graph, None, None, config.clone());

    let id = memory.remember(SMOKE_TEST_USER, "smoke test probe", 0.5, HashMap::new()).await?;
    let recalled = memory.recall(SMOKE_TEST_USER, "smoke test", config.retrieval_limit, &[]).await?;
    let counters = memory.consolidate(SMOKE_TEST_USER).await?;
    let gc = memory.garbage_collect(SMOKE_TEST_USER, Duration::days(0)).await?;

    println!(
        "{}",
        json!({
            "status": "ok",
            "remembered_id": id,
            "recalled_count": recalled.len(),
            "consolidation": { "promoted": counters.promoted, "decayed": counters.decayed, "forgotten": counters.forgotten },
            "gc": { "soft_deleted": gc.soft_deleted, "hard_deleted": gc.hard_deleted },
        })
    );
    Ok(())
}

pub async fn reset(config: &Config, confirmed: bool) -> Result<()> {
    if !confirmed {
        return Err(Error::Validation(
            "refusing to reset without --confirm: this destroys all volatile and graph data".to_string(),
        ));
    }

    let volatile = open_volatile(config).await?;
    let graph = open_graph(config).await?;
    volatile.wipe_all().await?;
    graph.wipe_all().await?;

    println!("{}", json!({ "status": "ok", "message": "volatile store and graph store wiped" }));
    Ok(())
}

pub async fn inspect(config: &Config, user: &str) -> Result<()> {
    let volatile = open_volatile(config).await?;
    let graph = open_graph(config).await?;
    let (volatile, graph) = as_trait_objects(&volatile, &graph);
    let memory = FractalMemory::new(volatile, graph, None, None, config.clone());

    let stats = memory.get_stats(user).await?;
    println!(
        "{}",
        json!({
            "user": user,
            "l0_count": stats.l0_size,
            "l1_count": stats.l1_size,
            "l2_count": stats.l2_size,
            "l3_count": stats.l3_size,
            "last_consolidation": stats.last_consolidation_at.map(|t| t.to_rfc3339()),
        })
    );
    Ok(())
}

pub async fn serve(config: &Config, user: &str, addr: SocketAddr, allowed_origins: Vec<String>) -> Result<()> {
    let volatile_concrete = open_volatile(config).await?;
    let graph_concrete = open_graph(config).await?;
    let (volatile, graph) = as_trait_objects(&volatile_concrete, &graph_concrete);
    let memory = FractalMemory::new(volatile.clone(), graph.clone(), None, None, config.clone());
    let facade = Arc::new(AgentFacade::new(config.clone(), volatile, graph, None, None, None, Some(memory)));

    let shutdown = CancellationToken::new();
    let background = tokio::spawn(Arc::clone(&facade).run_background(user.to_string(), shutdown.clone()));

    let result = http::serve(facade, user.to_string(), addr, &allowed_origins).await;
    shutdown.cancel();
    let _ = background.await;
    result.map_err(|e| Error::StoreUnavailable(format!("http server error: {e}")))
}
