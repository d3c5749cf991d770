//! [`GraphStore`] implementation over the schema in [`crate::schema`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use libsql::{params, Row};

use fractal_memory_core::constants::defaults::HARD_DELETE_BATCH_LIMIT;
use fractal_memory_core::error::{Error, Result};
use fractal_memory_core::store::graph::{GraphStore, ScoredEpisode};
use fractal_memory_core::types::{Entity, Episode, Outcome, Scale, Tier};

use crate::TursoGraphStore;

const EPISODE_COLUMNS: &str = "id, user_id, content, summary, source, tier, scale, outcome, importance, \
     access_count, created_at, last_accessed, deleted, deleted_at, content_hash, extra";

const ENTITY_COLUMNS: &str = "id, user_id, name, entity_type, created_at, deleted, deleted_at, extra";

fn tier_to_str(tier: Tier) -> &'static str {
    match tier {
        Tier::L0 => "L0",
        Tier::L1 => "L1",
        Tier::L2 => "L2",
        Tier::L3 => "L3",
    }
}

fn str_to_tier(s: &str) -> Result<Tier> {
    match s {
        "L0" => Ok(Tier::L0),
        "L1" => Ok(Tier::L1),
        "L2" => Ok(Tier::L2),
        "L3" => Ok(Tier::L3),
        other => Err(Error::IntegrityError(format!("unknown tier {other:?}"))),
    }
}

fn scale_to_str(scale: Scale) -> &'static str {
    match scale {
        Scale::Micro => "micro",
        Scale::Meso => "meso",
        Scale::Macro => "macro",
    }
}

fn str_to_scale(s: &str) -> Result<Scale> {
    match s {
        "micro" => Ok(Scale::Micro),
        "meso" => Ok(Scale::Meso),
        "macro" => Ok(Scale::Macro),
        other => Err(Error::IntegrityError(format!("unknown scale {other:?}"))),
    }
}

fn outcome_to_str(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "success",
        Outcome::Failure => "failure",
        Outcome::Partial => "partial",
        Outcome::Unknown => "unknown",
        Outcome::None => "none",
    }
}

fn str_to_outcome(s: &str) -> Result<Outcome> {
    match s {
        "success" => Ok(Outcome::Success),
        "failure" => Ok(Outcome::Failure),
        "partial" => Ok(Outcome::Partial),
        "unknown" => Ok(Outcome::Unknown),
        "none" => Ok(Outcome::None),
        other => Err(Error::IntegrityError(format!("unknown outcome {other:?}"))),
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::IntegrityError(format!("invalid timestamp {s:?}: {e}")))
}

/// Reconstructs an [`Episode`] from a row shaped like [`EPISODE_COLUMNS`].
pub fn row_to_episode(row: &Row) -> Result<Episode> {
    let map_err = |field: &'static str| move |e: libsql::Error| Error::IntegrityError(format!("column {field}: {e}"));

    let id: String = row.get(0).map_err(map_err("id"))?;
    let user_id: String = row.get(1).map_err(map_err("user_id"))?;
    let content: String = row.get(2).map_err(map_err("content"))?;
    let summary: Option<String> = row.get(3).map_err(map_err("summary"))?;
    let source: String = row.get(4).map_err(map_err("source"))?;
    let tier: String = row.get(5).map_err(map_err("tier"))?;
    let scale: String = row.get(6).map_err(map_err("scale"))?;
    let outcome: String = row.get(7).map_err(map_err("outcome"))?;
    let importance: f64 = row.get(8).map_err(map_err("importance"))?;
    let access_count: i64 = row.get(9).map_err(map_err("access_count"))?;
    let created_at: String = row.get(10).map_err(map_err("created_at"))?;
    let last_accessed: String = row.get(11).map_err(map_err("last_accessed"))?;
    let deleted: i64 = row.get(12).map_err(map_err("deleted"))?;
    let deleted_at: Option<String> = row.get(13).map_err(map_err("deleted_at"))?;
    let content_hash: i64 = row.get(14).map_err(map_err("content_hash"))?;
    let extra: String = row.get(15).map_err(map_err("extra"))?;
    let _ = content_hash; // recomputed on demand via Episode::content_hash

    Ok(Episode {
        id,
        content,
        summary,
        source,
        created_at: parse_rfc3339(&created_at)?,
        last_accessed: parse_rfc3339(&last_accessed)?,
        importance: importance as f32,
        access_count: access_count as u64,
        tier: str_to_tier(&tier)?,
        outcome: str_to_outcome(&outcome)?,
        deleted: deleted != 0,
        deleted_at: deleted_at.map(|s| parse_rfc3339(&s)).transpose()?,
        scale: str_to_scale(&scale)?,
        user_id,
        embedding: None,
        extra: serde_json::from_str(&extra).map_err(Error::Serialization)?,
    })
}

/// Reconstructs an [`Entity`] from a row shaped like [`ENTITY_COLUMNS`].
fn row_to_entity(row: &Row) -> Result<Entity> {
    let map_err = |field: &'static str| move |e: libsql::Error| Error::IntegrityError(format!("column {field}: {e}"));

    let id: String = row.get(0).map_err(map_err("id"))?;
    let user_id: String = row.get(1).map_err(map_err("user_id"))?;
    let name: String = row.get(2).map_err(map_err("name"))?;
    let entity_type: String = row.get(3).map_err(map_err("entity_type"))?;
    let created_at: String = row.get(4).map_err(map_err("created_at"))?;
    let deleted: i64 = row.get(5).map_err(map_err("deleted"))?;
    let deleted_at: Option<String> = row.get(6).map_err(map_err("deleted_at"))?;
    let extra: String = row.get(7).map_err(map_err("extra"))?;
    let _ = extra;

    Ok(Entity {
        id,
        name,
        entity_type,
        importance: 0.5,
        access_count: 0,
        embedding: None,
        created_at: parse_rfc3339(&created_at)?,
        last_accessed: parse_rfc3339(&created_at)?,
        deleted: deleted != 0,
        deleted_at: deleted_at.map(|s| parse_rfc3339(&s)).transpose()?,
        user_id,
    })
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl GraphStore for TursoGraphStore {
    async fn upsert_episode(&self, episode: &Episode, mentions: &[String]) -> Result<()> {
        let conn = self.get_connection().await?;
        let extra_json = serde_json::to_string(&episode.extra).map_err(Error::Serialization)?;

        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO episodes ({EPISODE_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)"
            ),
            params![
                episode.id.clone(),
                episode.user_id.clone(),
                episode.content.clone(),
                episode.summary.clone(),
                episode.source.clone(),
                tier_to_str(episode.tier),
                scale_to_str(episode.scale),
                outcome_to_str(episode.outcome),
                f64::from(episode.importance),
                episode.access_count as i64,
                episode.created_at.to_rfc3339(),
                episode.last_accessed.to_rfc3339(),
                i64::from(episode.deleted),
                episode.deleted_at.map(|d| d.to_rfc3339()),
                episode.content_hash() as i64,
                extra_json,
            ],
        )
        .await
        .map_err(|e| Error::StoreUnavailable(format!("upsert_episode failed: {e}")))?;

        if let Some(embedding) = &episode.embedding {
            let vector_json = serde_json::to_string(embedding).map_err(Error::Serialization)?;
            conn.execute(
                "INSERT OR REPLACE INTO embeddings (episode_id, user_id, vector_json) VALUES (?, ?, ?)",
                params![episode.id.clone(), episode.user_id.clone(), vector_json],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("upsert_episode embedding failed: {e}")))?;
        }

        for entity_id in mentions {
            conn.execute(
                "INSERT OR IGNORE INTO mentions (episode_id, entity_id) VALUES (?, ?)",
                params![episode.id.clone(), entity_id.clone()],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("upsert_episode mention failed: {e}")))?;
        }

        Ok(())
    }

    async fn get_episode(&self, user: &str, id: &str) -> Result<Option<Episode>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE user_id = ? AND id = ?"),
                params![user.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("get_episode failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("get_episode fetch failed: {e}")))?
        {
            Some(row) => Ok(Some(row_to_episode(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.execute(
            "INSERT INTO entities (id, user_id, name, entity_type, created_at, extra) VALUES (?, ?, ?, ?, ?, '{}') \
             ON CONFLICT(user_id, name) DO UPDATE SET entity_type = excluded.entity_type, deleted = 0, deleted_at = NULL",
            params![
                entity.id.clone(),
                entity.user_id.clone(),
                entity.name.clone(),
                entity.entity_type.clone(),
                entity.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| Error::StoreUnavailable(format!("upsert_entity failed: {e}")))?;
        Ok(())
    }

    async fn find_entity_by_name(&self, user: &str, name: &str) -> Result<Option<Entity>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE user_id = ? AND name = ? AND deleted = 0"),
                params![user.to_string(), name.to_string()],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("find_entity_by_name failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("find_entity_by_name fetch failed: {e}")))?
        {
            Some(row) => Ok(Some(row_to_entity(&row)?)),
            None => Ok(None),
        }
    }

    async fn soft_delete(&self, user: &str, node_id: &str) -> Result<()> {
        let conn = self.get_connection().await?;
        let now = Utc::now().to_rfc3339();
        let changed = conn
            .execute(
                "UPDATE episodes SET deleted = 1, deleted_at = ? WHERE user_id = ? AND id = ?",
                params![now.clone(), user.to_string(), node_id.to_string()],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("soft_delete episode failed: {e}")))?;

        if changed == 0 {
            conn.execute(
                "UPDATE entities SET deleted = 1, deleted_at = ? WHERE user_id = ? AND id = ?",
                params![now, user.to_string(), node_id.to_string()],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("soft_delete entity failed: {e}")))?;
        }
        Ok(())
    }

    async fn hard_delete_expired(&self, user: &str, grace: Duration) -> Result<u64> {
        let conn = self.get_connection().await?;
        let cutoff = (Utc::now() - grace).to_rfc3339();

        let mut ids = Vec::new();
        let mut rows = conn
            .query(
                "SELECT id FROM episodes WHERE user_id = ? AND deleted = 1 AND deleted_at <= ? LIMIT ?",
                params![user.to_string(), cutoff, HARD_DELETE_BATCH_LIMIT as i64],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("hard_delete_expired scan failed: {e}")))?;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("hard_delete_expired fetch failed: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| Error::IntegrityError(format!("hard_delete_expired id column: {e}")))?;
            ids.push(id);
        }

        for id in &ids {
            conn.execute("DELETE FROM mentions WHERE episode_id = ?", params![id.clone()])
                .await
                .map_err(|e| Error::StoreUnavailable(format!("hard_delete_expired mentions cleanup failed: {e}")))?;
            conn.execute("DELETE FROM embeddings WHERE episode_id = ?", params![id.clone()])
                .await
                .map_err(|e| Error::StoreUnavailable(format!("hard_delete_expired embeddings cleanup failed: {e}")))?;
            conn.execute("DELETE FROM episodes WHERE id = ?", params![id.clone()])
                .await
                .map_err(|e| Error::StoreUnavailable(format!("hard_delete_expired delete failed: {e}")))?;
        }

        Ok(ids.len() as u64)
    }

    async fn vector_search(&self, user: &str, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredEpisode>> {
        if query_embedding.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT e.episode_id, e.vector_json FROM embeddings e \
                 JOIN episodes ep ON ep.id = e.episode_id \
                 WHERE e.user_id = ? AND ep.deleted = 0",
                params![user.to_string()],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("vector_search query failed: {e}")))?;

        let mut scored = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("vector_search fetch failed: {e}")))?
        {
            let episode_id: String = row
                .get(0)
                .map_err(|e| Error::IntegrityError(format!("vector_search episode_id column: {e}")))?;
            let vector_json: String = row
                .get(1)
                .map_err(|e| Error::IntegrityError(format!("vector_search vector_json column: {e}")))?;
            let embedding: Vec<f32> = serde_json::from_str(&vector_json).map_err(Error::Serialization)?;
            let score = cosine_similarity(query_embedding, &embedding);
            scored.push(ScoredEpisode { episode_id, score });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn keyword_search(&self, user: &str, query_text: &str, k: usize) -> Result<Vec<ScoredEpisode>> {
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_connection().await?;
        let query_result = conn
            .query(
                "SELECT id, bm25(episodes_fts) AS rank FROM episodes_fts \
                 WHERE episodes_fts MATCH ? AND user_id = ? ORDER BY rank LIMIT ?",
                params![query_text.to_string(), user.to_string(), k as i64],
            )
            .await;

        let mut rows = match query_result {
            Ok(rows) => rows,
            Err(_) => return Ok(Vec::new()),
        };

        let mut scored = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("keyword_search fetch failed: {e}")))?
        {
            let episode_id: String = row
                .get(0)
                .map_err(|e| Error::IntegrityError(format!("keyword_search id column: {e}")))?;
            let rank: f64 = row
                .get(1)
                .map_err(|e| Error::IntegrityError(format!("keyword_search rank column: {e}")))?;
            // bm25() returns a negative, lower-is-better value; negate so score is higher-is-better.
            scored.push(ScoredEpisode { episode_id, score: -rank as f32 });
        }
        Ok(scored)
    }

    async fn graph_search(
        &self,
        user: &str,
        seed_entities: &[String],
        k: usize,
        max_hops: u32,
    ) -> Result<Vec<ScoredEpisode>> {
        if seed_entities.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_connection().await?;
        let placeholders = seed_entities.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "WITH RECURSIVE walk(entity_id, hop) AS ( \
                 SELECT id, 0 FROM entities WHERE user_id = ? AND deleted = 0 AND name IN ({placeholders}) \
                 UNION ALL \
                 SELECT m2.entity_id, walk.hop + 1 \
                 FROM walk \
                 JOIN mentions m1 ON m1.entity_id = walk.entity_id \
                 JOIN mentions m2 ON m2.episode_id = m1.episode_id AND m2.entity_id != walk.entity_id \
                 WHERE walk.hop < ? \
             ), \
             hops(entity_id, min_hop) AS ( \
                 SELECT entity_id, MIN(hop) FROM walk GROUP BY entity_id \
             ) \
             SELECT e.id, MIN(hops.min_hop) AS min_hop, e.created_at \
             FROM hops \
             JOIN mentions m ON m.entity_id = hops.entity_id \
             JOIN episodes e ON e.id = m.episode_id \
             WHERE e.user_id = ? AND e.deleted = 0 \
             GROUP BY e.id \
             ORDER BY min_hop ASC, e.created_at DESC \
             LIMIT ?"
        );

        let mut bind_params: Vec<libsql::Value> = vec![libsql::Value::Text(user.to_string())];
        bind_params.extend(seed_entities.iter().map(|n| libsql::Value::Text(n.clone())));
        bind_params.push(libsql::Value::Integer(i64::from(max_hops)));
        bind_params.push(libsql::Value::Text(user.to_string()));
        bind_params.push(libsql::Value::Integer(k as i64));

        let mut rows = conn
            .query(&sql, libsql::params_from_iter(bind_params))
            .await
            .map_err(|e| Error::StoreUnavailable(format!("graph_search failed: {e}")))?;

        let mut scored = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("graph_search fetch failed: {e}")))?
        {
            let episode_id: String = row
                .get(0)
                .map_err(|e| Error::IntegrityError(format!("graph_search id column: {e}")))?;
            let min_hop: i64 = row
                .get(1)
                .map_err(|e| Error::IntegrityError(format!("graph_search min_hop column: {e}")))?;
            scored.push(ScoredEpisode { episode_id, score: 1.0 / (1.0 + min_hop as f32) });
        }
        Ok(scored)
    }

    async fn apply_decay(&self, user: &str, half_life: Duration) -> Result<u64> {
        let conn = self.get_connection().await?;
        let cutoff = (Utc::now() - half_life).to_rfc3339();
        let changed = conn
            .execute(
                "UPDATE episodes SET importance = importance * 0.5 \
                 WHERE user_id = ? AND deleted = 0 AND last_accessed <= ?",
                params![user.to_string(), cutoff],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("apply_decay failed: {e}")))?;
        Ok(changed)
    }

    async fn exists_duplicate(&self, user: &str, content_hash: u64) -> Result<bool> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM episodes WHERE user_id = ? AND content_hash = ? AND deleted = 0 LIMIT 1",
                params![user.to_string(), content_hash as i64],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("exists_duplicate failed: {e}")))?;
        Ok(rows
            .next()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("exists_duplicate fetch failed: {e}")))?
            .is_some())
    }

    async fn count_live(&self, user: &str, tier: Option<Tier>) -> Result<u64> {
        let conn = self.get_connection().await?;
        let mut rows = match tier {
            Some(tier) => conn
                .query(
                    "SELECT COUNT(*) FROM episodes WHERE user_id = ? AND tier = ? AND deleted = 0",
                    params![user.to_string(), tier_to_str(tier)],
                )
                .await
                .map_err(|e| Error::StoreUnavailable(format!("count_live failed: {e}")))?,
            None => conn
                .query(
                    "SELECT COUNT(*) FROM episodes WHERE user_id = ? AND deleted = 0",
                    params![user.to_string()],
                )
                .await
                .map_err(|e| Error::StoreUnavailable(format!("count_live failed: {e}")))?,
        };

        let row = rows
            .next()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("count_live fetch failed: {e}")))?
            .ok_or_else(|| Error::IntegrityError("count_live returned no rows".into()))?;
        let count: i64 = row
            .get(0)
            .map_err(|e| Error::IntegrityError(format!("count_live count column: {e}")))?;
        Ok(count as u64)
    }

    async fn list_tier(&self, user: &str, tier: Tier, limit: usize) -> Result<Vec<Episode>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EPISODE_COLUMNS} FROM episodes WHERE user_id = ? AND tier = ? AND deleted = 0 \
                     ORDER BY created_at DESC LIMIT ?"
                ),
                params![user.to_string(), tier_to_str(tier), limit as i64],
            )
            .await
            .map_err(|e| Error::StoreUnavailable(format!("list_tier failed: {e}")))?;

        let mut episodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("list_tier fetch failed: {e}")))?
        {
            episodes.push(row_to_episode(&row)?);
        }
        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractal_memory_core::types::Episode as CoreEpisode;

    async fn store() -> TursoGraphStore {
        TursoGraphStore::open_memory().await.unwrap()
    }

    fn episode(user: &str, content: &str, importance: f32, tier: Tier) -> CoreEpisode {
        let mut e = CoreEpisode::new(user, content, importance).unwrap();
        e.tier = tier;
        e
    }

    #[tokio::test]
    async fn upsert_and_get_episode_round_trips() {
        let store = store().await;
        let e = episode("u1", "hello world", 0.6, Tier::L2);
        store.upsert_episode(&e, &[]).await.unwrap();

        let got = store.get_episode("u1", &e.id).await.unwrap().unwrap();
        assert_eq!(got.content, "hello world");
        assert_eq!(got.tier, Tier::L2);
    }

    #[tokio::test]
    async fn soft_delete_then_hard_delete_expired_removes_row() {
        let store = store().await;
        let e = episode("u1", "to be forgotten", 0.1, Tier::L2);
        store.upsert_episode(&e, &[]).await.unwrap();
        store.soft_delete("u1", &e.id).await.unwrap();

        let removed = store.hard_delete_expired("u1", Duration::seconds(-1)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_episode("u1", &e.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exists_duplicate_detects_matching_content_hash() {
        let store = store().await;
        let e = episode("u1", "duplicate me", 0.5, Tier::L2);
        store.upsert_episode(&e, &[]).await.unwrap();
        assert!(store.exists_duplicate("u1", e.content_hash()).await.unwrap());
        assert!(!store.exists_duplicate("u1", 0).await.unwrap());
    }

    #[tokio::test]
    async fn count_live_and_list_tier_respect_tier_filter() {
        let store = store().await;
        store.upsert_episode(&episode("u1", "a", 0.5, Tier::L2), &[]).await.unwrap();
        store.upsert_episode(&episode("u1", "b", 0.5, Tier::L3), &[]).await.unwrap();

        assert_eq!(store.count_live("u1", Some(Tier::L2)).await.unwrap(), 1);
        assert_eq!(store.count_live("u1", None).await.unwrap(), 2);
        assert_eq!(store.list_tier("u1", Tier::L3, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn vector_search_ranks_by_cosine_similarity() {
        let store = store().await;
        let mut a = episode("u1", "a", 0.5, Tier::L2);
        a.embedding = Some(vec![1.0, 0.0]);
        let mut b = episode("u1", "b", 0.5, Tier::L2);
        b.embedding = Some(vec![0.0, 1.0]);
        store.upsert_episode(&a, &[]).await.unwrap();
        store.upsert_episode(&b, &[]).await.unwrap();

        let hits = store.vector_search("u1", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits[0].episode_id, a.id);
    }

    #[tokio::test]
    async fn soft_delete_marks_entity_deleted_without_destroying_it() {
        let store = store().await;
        let alice = Entity::new("u1", "alice", "person");
        store.upsert_entity(&alice).await.unwrap();

        store.soft_delete("u1", &alice.id).await.unwrap();
        assert!(store.find_entity_by_name("u1", "alice").await.unwrap().is_none());

        let conn = store.get_connection().await.unwrap();
        let mut rows = conn
            .query(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?"),
                params![alice.id.clone()],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().expect("entity row must still exist");
        let restored = row_to_entity(&row).unwrap();
        assert!(restored.deleted);
        assert!(restored.deleted_at.is_some());
    }

    #[tokio::test]
    async fn graph_search_finds_episodes_within_hop_budget() {
        let store = store().await;
        let alice = Entity::new("u1", "alice", "person");
        let bob = Entity::new("u1", "bob", "person");
        store.upsert_entity(&alice).await.unwrap();
        store.upsert_entity(&bob).await.unwrap();

        let shared = episode("u1", "alice met bob", 0.5, Tier::L2);
        store.upsert_episode(&shared, &[alice.id.clone(), bob.id.clone()]).await.unwrap();

        let hits = store.graph_search("u1", &["alice".to_string()], 5, 1).await.unwrap();
        assert!(hits.iter().any(|h| h.episode_id == shared.id));
    }

    #[tokio::test]
    async fn apply_decay_halves_stale_importance() {
        let store = store().await;
        let mut e = episode("u1", "stale", 0.8, Tier::L2);
        e.last_accessed = Utc::now() - Duration::days(60);
        store.upsert_episode(&e, &[]).await.unwrap();

        let changed = store.apply_decay("u1", Duration::days(30)).await.unwrap();
        assert_eq!(changed, 1);
        let got = store.get_episode("u1", &e.id).await.unwrap().unwrap();
        assert!((got.importance - 0.4).abs() < 1e-6);
    }
}
