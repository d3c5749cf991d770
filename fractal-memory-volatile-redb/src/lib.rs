//! redb-backed [`VolatileStore`](fractal_memory_core::VolatileStore): an
//! embedded, file-backed implementation of the L0 append log, the L1
//! session-record map, and the consolidation lock primitive.
//!
//! Mirrors the teacher crate's shape: synchronous redb transactions are run
//! inside [`tokio::task::spawn_blocking`] and wrapped with a timeout so a
//! stuck disk never hangs the async runtime indefinitely.

mod keys;
mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::info;

use fractal_memory_core::error::{Error, Result};

/// L0 entries, keyed by `user\0<20-digit zero-padded sequence>`.
pub(crate) const L0_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("l0_episodes");
/// L1 session records, keyed by `user\0<session_id>`.
pub(crate) const L1_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("l1_sessions");
/// Per-user L0 counters `(next_seq, oldest_seq, len)`, keyed by `user`.
pub(crate) const L0_COUNTERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("l0_counters");
/// Consolidation / distributed locks, keyed by lock key.
pub(crate) const LOCKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("locks");

const DB_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a blocking redb operation on the blocking pool, bounded by
/// [`DB_OPERATION_TIMEOUT`] so a wedged database surfaces as a recoverable
/// [`Error::StoreUnavailable`] instead of hanging the caller forever.
pub(crate) async fn with_db_timeout<T, F>(operation: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(DB_OPERATION_TIMEOUT, tokio::task::spawn_blocking(operation)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(Error::StoreUnavailable(format!("redb task join error: {join_err}"))),
        Err(_) => Err(Error::StoreUnavailable(format!(
            "redb operation timed out after {DB_OPERATION_TIMEOUT:?}"
        ))),
    }
}

/// The redb-backed Volatile Store.
pub struct RedbVolatileStore {
    pub(crate) db: Arc<Database>,
}

impl RedbVolatileStore {
    /// Opens (creating if absent) a redb database file at `path` and
    /// ensures its tables exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the database file cannot be
    /// created or opened.
    pub async fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "opening redb volatile store");
        let path_buf = path.to_path_buf();
        let db = with_db_timeout(move || {
            Database::create(&path_buf).map_err(|e| Error::StoreUnavailable(format!("failed to open redb database: {e}")))
        })
        .await?;

        let store = Self { db: Arc::new(db) };
        store.initialize_tables().await?;
        Ok(store)
    }

    /// In-memory-equivalent convenience for tests: a redb database backed by
    /// a temporary file that is removed when the returned guard drops.
    #[cfg(test)]
    pub async fn open_temp() -> Result<(Self, tempfile::TempDir)> {
        let dir = tempfile::tempdir().map_err(Error::Io)?;
        let path = dir.path().join("volatile.redb");
        let store = Self::open(&path).await?;
        Ok((store, dir))
    }

    async fn initialize_tables(&self) -> Result<()> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin write transaction: {e}")))?;
            {
                write_txn
                    .open_table(L0_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open l0 table: {e}")))?;
                write_txn
                    .open_table(L1_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open l1 table: {e}")))?;
                write_txn
                    .open_table(L0_COUNTERS_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open l0 counters table: {e}")))?;
                write_txn
                    .open_table(LOCKS_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open locks table: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::StoreUnavailable(format!("failed to commit table init: {e}")))?;
            Ok(())
        })
        .await
    }

    /// Destructively clears every table (§6.5 `reset`): all users' L0
    /// entries, L1 sessions, L0 counters, and locks.
    pub async fn wipe_all(&self) -> Result<()> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin write transaction: {e}")))?;
            for table_def in [L0_TABLE, L1_TABLE, L0_COUNTERS_TABLE, LOCKS_TABLE] {
                let mut table = write_txn
                    .open_table(table_def)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open table: {e}")))?;
                let keys: Vec<String> = table
                    .iter()
                    .map_err(|e| Error::StoreUnavailable(format!("failed to iterate table: {e}")))?
                    .filter_map(|entry| entry.ok())
                    .map(|(key, _)| key.value().to_string())
                    .collect();
                for key in keys {
                    table
                        .remove(key.as_str())
                        .map_err(|e| Error::StoreUnavailable(format!("failed to clear table: {e}")))?;
                }
            }
            write_txn.commit().map_err(|e| Error::StoreUnavailable(format!("failed to commit wipe: {e}")))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_and_initializes_tables() {
        let (_store, _dir) = RedbVolatileStore::open_temp().await.unwrap();
    }

    #[tokio::test]
    async fn wipe_all_clears_every_table() {
        use fractal_memory_core::store::volatile::{SessionRecord, VolatileStore};
        use fractal_memory_core::types::Episode;

        let (store, _dir) = RedbVolatileStore::open_temp().await.unwrap();
        let episode = Episode::new("u1", "hello", 0.5).unwrap();
        store.l0_append("u1", episode, 100).await.unwrap();
        store
            .l1_put(
                "u1",
                SessionRecord {
                    session_id: "s1".to_string(),
                    summary: "summary".to_string(),
                    importance: 0.5,
                    source_count: 1,
                    created_at: chrono::Utc::now(),
                    extra: Default::default(),
                },
            )
            .await
            .unwrap();

        store.wipe_all().await.unwrap();

        assert_eq!(store.l0_len("u1").await.unwrap(), 0);
        assert_eq!(store.l1_len("u1").await.unwrap(), 0);
    }
}
