//! libSQL/Turso-backed [`GraphStore`](fractal_memory_core::GraphStore): durable
//! persistence of L2/L3 episodes and entities, vector search over JSON-stored
//! embeddings, FTS5 keyword search, and bounded-hop graph traversal over an
//! episode-entity mention table.
//!
//! Mirrors the teacher crate's connection and retry shape, minus connection
//! pooling: a single [`libsql::Database`] handle, a fresh [`libsql::Connection`]
//! per call, and [`fractal_memory_core::retry::with_retry`] wrapping schema
//! writes against transient network errors.

mod fts5_schema;
mod schema;
mod store;

use std::sync::Arc;

use libsql::{Builder, Connection, Database};
use tracing::info;

use fractal_memory_core::error::{Error, Result};
use fractal_memory_core::retry::RetryConfig;

pub use store::row_to_episode;

/// Schema version this build expects. Bump when `schema::ALL_SCHEMA_STATEMENTS`
/// changes in a way that needs a recorded migration entry.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// A recorded schema version, as `Migration{version, applied_at, name}` (§6.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub applied_at: String,
}

/// The libSQL/Turso-backed Graph Store.
#[derive(Debug)]
pub struct TursoGraphStore {
    db: Arc<Database>,
    retry: RetryConfig,
}

impl TursoGraphStore {
    /// Opens a store at `url` (`libsql://`, `file:`, or `:memory:` only) with
    /// the default retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a disallowed URL scheme or a missing
    /// token on a remote connection, or [`Error::StoreUnavailable`] if the
    /// connection cannot be established.
    pub async fn new(url: &str, token: &str) -> Result<Self> {
        Self::with_retry_config(url, token, RetryConfig::default()).await
    }

    /// Like [`Self::new`], with an explicit retry policy for schema setup.
    pub async fn with_retry_config(url: &str, token: &str, retry: RetryConfig) -> Result<Self> {
        info!(url, "connecting to graph store");

        if !url.starts_with("libsql://") && !url.starts_with("file:") && !url.starts_with(":memory:") {
            return Err(Error::Validation(format!(
                "insecure graph store url {url:?}: only libsql://, file:, or :memory: are allowed"
            )));
        }
        if url.starts_with("libsql://") && token.trim().is_empty() {
            return Err(Error::Validation(
                "authentication token required for remote libsql:// connections".into(),
            ));
        }

        let db = if let Some(remote_url) = url.strip_prefix("libsql://") {
            Builder::new_remote(format!("libsql://{remote_url}"), token.to_string())
                .build()
                .await
                .map_err(|e| Error::StoreUnavailable(format!("failed to connect to graph store: {e}")))?
        } else if let Some(path) = url.strip_prefix("file:") {
            Builder::new_local(path)
                .build()
                .await
                .map_err(|e| Error::StoreUnavailable(format!("failed to open local graph store: {e}")))?
        } else {
            Builder::new_local(":memory:")
                .build()
                .await
                .map_err(|e| Error::StoreUnavailable(format!("failed to open in-memory graph store: {e}")))?
        };

        let store = Self { db: Arc::new(db), retry };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub async fn open_memory() -> Result<Self> {
        Self::new(":memory:", "").await
    }

    pub(crate) async fn get_connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| Error::StoreUnavailable(format!("failed to open graph store connection: {e}")))
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.get_connection().await?;
        for statement in schema::ALL_SCHEMA_STATEMENTS {
            self.execute_ddl(&conn, statement).await?;
        }
        for statement in fts5_schema::ALL_FTS5_STATEMENTS {
            // FTS5 may be unavailable in some libsql builds; degrade to
            // keyword search returning no rows rather than failing startup.
            if self.execute_ddl(&conn, statement).await.is_err() {
                info!("fts5 unavailable, keyword search will be a no-op");
                break;
            }
        }
        Ok(())
    }

    async fn execute_ddl(&self, conn: &Connection, sql: &str) -> Result<()> {
        fractal_memory_core::retry::with_retry(&self.retry, || async {
            conn.execute(sql, ())
                .await
                .map(|_| ())
                .map_err(|e| Error::StoreUnavailable(format!("schema statement failed: {e}")))
        })
        .await
    }

    /// Lists schema versions already recorded in `schema_migrations`, ordered
    /// oldest first.
    pub async fn applied_migrations(&self) -> Result<Vec<Migration>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query("SELECT version, name, applied_at FROM schema_migrations ORDER BY version ASC", ())
            .await
            .map_err(|e| Error::StoreUnavailable(format!("failed to read migrations: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::StoreUnavailable(e.to_string()))? {
            let version: i64 = row.get(0).map_err(|e| Error::IntegrityError(e.to_string()))?;
            let name: String = row.get(1).map_err(|e| Error::IntegrityError(e.to_string()))?;
            let applied_at: String = row.get(2).map_err(|e| Error::IntegrityError(e.to_string()))?;
            out.push(Migration { version, name, applied_at });
        }
        Ok(out)
    }

    /// Applies migrations up to [`CURRENT_SCHEMA_VERSION`]. The DDL itself is
    /// already idempotent (`CREATE TABLE IF NOT EXISTS`) and has run by the
    /// time the store is constructed; this records that fact so `inspect`
    /// and `migrate --dry-run`-style callers can see what's applied.
    pub async fn apply_pending_migrations(&self) -> Result<Vec<Migration>> {
        let applied = self.applied_migrations().await?;
        if applied.iter().any(|m| m.version == CURRENT_SCHEMA_VERSION) {
            return Ok(applied);
        }

        let conn = self.get_connection().await?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            libsql::params![CURRENT_SCHEMA_VERSION, "initial_schema", now],
        )
        .await
        .map_err(|e| Error::StoreUnavailable(format!("failed to record migration: {e}")))?;

        self.applied_migrations().await
    }

    /// Destructively deletes every episode, entity, and mention row across
    /// all users, keeping the schema itself intact (§6.5 `reset`).
    pub async fn wipe_all(&self) -> Result<()> {
        let conn = self.get_connection().await?;
        for table in ["mentions", "embeddings", "episodes", "entities"] {
            conn.execute(&format!("DELETE FROM {table}"), ())
                .await
                .map_err(|e| Error::StoreUnavailable(format!("failed to wipe {table}: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_and_initializes_schema() {
        let store = TursoGraphStore::open_memory().await.unwrap();
        let conn = store.get_connection().await.unwrap();
        let mut rows = conn
            .query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'episodes'", ())
            .await
            .unwrap();
        assert!(rows.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejects_insecure_url_scheme() {
        let err = TursoGraphStore::new("http://example.com", "token").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_remote_url_without_token() {
        let err = TursoGraphStore::new("libsql://example.turso.io", "").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn apply_pending_migrations_is_idempotent() {
        let store = TursoGraphStore::open_memory().await.unwrap();
        let first = store.apply_pending_migrations().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].version, CURRENT_SCHEMA_VERSION);

        let second = store.apply_pending_migrations().await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn wipe_all_removes_episodes() {
        use fractal_memory_core::store::graph::GraphStore;
        use fractal_memory_core::types::Episode;

        let store = TursoGraphStore::open_memory().await.unwrap();
        let episode = Episode::new("u1", "hello", 0.5).unwrap();
        store.upsert_episode(&episode, &[]).await.unwrap();

        store.wipe_all().await.unwrap();

        assert_eq!(store.count_live("u1", None).await.unwrap(), 0);
    }
}
