//! [`VolatileStore`] implementation over the tables declared in `lib.rs`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use fractal_memory_core::error::{Error, Result};
use fractal_memory_core::store::volatile::{LockOutcome, ReleaseOutcome, SessionRecord, VolatileStore};
use fractal_memory_core::types::Episode;

use crate::keys::{l0_key, l0_prefix_range, l1_key, l1_prefix_range};
use crate::{with_db_timeout, RedbVolatileStore, L0_COUNTERS_TABLE, L0_TABLE, L1_TABLE, LOCKS_TABLE};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
struct L0Counters {
    next_seq: u64,
    oldest_seq: u64,
    len: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockEntry {
    token: String,
    expires_at_millis: u128,
}

fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0)
}

fn ser<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(Error::Serialization)
}

fn de<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(Error::Serialization)
}

fn read_counters(db: &Database, user: &str) -> Result<L0Counters> {
    let read_txn = db
        .begin_read()
        .map_err(|e| Error::StoreUnavailable(format!("failed to begin read transaction: {e}")))?;
    let table = read_txn
        .open_table(L0_COUNTERS_TABLE)
        .map_err(|e| Error::StoreUnavailable(format!("failed to open l0 counters table: {e}")))?;
    match table
        .get(user)
        .map_err(|e| Error::StoreUnavailable(format!("failed to read l0 counters: {e}")))?
    {
        Some(bytes) => de(bytes.value()),
        None => Ok(L0Counters::default()),
    }
}

#[async_trait]
impl VolatileStore for RedbVolatileStore {
    async fn l0_append(&self, user: &str, episode: Episode, cap: usize) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        with_db_timeout(move || {
            let mut counters = read_counters(&db, &user)?;
            let episode_bytes = ser(&episode)?;

            let write_txn = db
                .begin_write()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin write transaction: {e}")))?;
            let mut overflowed = false;
            {
                let mut l0 = write_txn
                    .open_table(L0_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open l0 table: {e}")))?;
                let key = l0_key(&user, counters.next_seq);
                l0.insert(key.as_str(), episode_bytes.as_slice())
                    .map_err(|e| Error::StoreUnavailable(format!("failed to insert l0 entry: {e}")))?;
                counters.next_seq += 1;
                counters.len += 1;

                while counters.len > cap as u64 {
                    let stale_key = l0_key(&user, counters.oldest_seq);
                    l0.remove(stale_key.as_str())
                        .map_err(|e| Error::StoreUnavailable(format!("failed to evict l0 entry: {e}")))?;
                    counters.oldest_seq += 1;
                    counters.len -= 1;
                    overflowed = true;
                }
            }
            {
                let mut counters_table = write_txn
                    .open_table(L0_COUNTERS_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open l0 counters table: {e}")))?;
                let bytes = ser(&counters)?;
                counters_table
                    .insert(user.as_str(), bytes.as_slice())
                    .map_err(|e| Error::StoreUnavailable(format!("failed to write l0 counters: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::StoreUnavailable(format!("failed to commit l0 append: {e}")))?;
            Ok(overflowed)
        })
        .await
    }

    async fn l0_read(&self, user: &str, n: usize) -> Result<Vec<Episode>> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(L0_TABLE)
                .map_err(|e| Error::StoreUnavailable(format!("failed to open l0 table: {e}")))?;
            let (start, end) = l0_prefix_range(&user);
            let mut episodes = Vec::new();
            for entry in table
                .range(start.as_str()..end.as_str())
                .map_err(|e| Error::StoreUnavailable(format!("failed to range l0 table: {e}")))?
            {
                let (_, value) = entry.map_err(|e| Error::StoreUnavailable(format!("failed to read l0 entry: {e}")))?;
                episodes.push(de::<Episode>(value.value())?);
            }
            episodes.reverse();
            episodes.truncate(n);
            Ok(episodes)
        })
        .await
    }

    async fn l0_range_pop(&self, user: &str, k: usize) -> Result<Vec<Episode>> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        with_db_timeout(move || {
            let mut counters = read_counters(&db, &user)?;
            let to_pop = (k as u64).min(counters.len);

            let write_txn = db
                .begin_write()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin write transaction: {e}")))?;
            let mut popped = Vec::with_capacity(to_pop as usize);
            {
                let mut l0 = write_txn
                    .open_table(L0_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open l0 table: {e}")))?;
                for _ in 0..to_pop {
                    let key = l0_key(&user, counters.oldest_seq);
                    if let Some(bytes) = l0
                        .remove(key.as_str())
                        .map_err(|e| Error::StoreUnavailable(format!("failed to pop l0 entry: {e}")))?
                    {
                        popped.push(de::<Episode>(bytes.value())?);
                    }
                    counters.oldest_seq += 1;
                    counters.len -= 1;
                }
            }
            {
                let mut counters_table = write_txn
                    .open_table(L0_COUNTERS_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open l0 counters table: {e}")))?;
                let bytes = ser(&counters)?;
                counters_table
                    .insert(user.as_str(), bytes.as_slice())
                    .map_err(|e| Error::StoreUnavailable(format!("failed to write l0 counters: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::StoreUnavailable(format!("failed to commit l0 pop: {e}")))?;
            Ok(popped)
        })
        .await
    }

    async fn l0_len(&self, user: &str) -> Result<u64> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        with_db_timeout(move || Ok(read_counters(&db, &user)?.len)).await
    }

    async fn l1_put(&self, user: &str, record: SessionRecord) -> Result<()> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        with_db_timeout(move || {
            let bytes = ser(&record)?;
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin write transaction: {e}")))?;
            {
                let mut l1 = write_txn
                    .open_table(L1_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open l1 table: {e}")))?;
                let key = l1_key(&user, &record.session_id);
                l1.insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| Error::StoreUnavailable(format!("failed to insert l1 record: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::StoreUnavailable(format!("failed to commit l1 put: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn l1_list(&self, user: &str, limit: usize) -> Result<Vec<SessionRecord>> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(L1_TABLE)
                .map_err(|e| Error::StoreUnavailable(format!("failed to open l1 table: {e}")))?;
            let (start, end) = l1_prefix_range(&user);
            let mut records = Vec::new();
            for entry in table
                .range(start.as_str()..end.as_str())
                .map_err(|e| Error::StoreUnavailable(format!("failed to range l1 table: {e}")))?
            {
                let (_, value) = entry.map_err(|e| Error::StoreUnavailable(format!("failed to read l1 entry: {e}")))?;
                records.push(de::<SessionRecord>(value.value())?);
            }
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            records.truncate(limit);
            Ok(records)
        })
        .await
    }

    async fn l1_delete(&self, user: &str, session_id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = l1_key(user, session_id);
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin write transaction: {e}")))?;
            {
                let mut l1 = write_txn
                    .open_table(L1_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open l1 table: {e}")))?;
                l1.remove(key.as_str())
                    .map_err(|e| Error::StoreUnavailable(format!("failed to delete l1 record: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::StoreUnavailable(format!("failed to commit l1 delete: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn l1_len(&self, user: &str) -> Result<u64> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(L1_TABLE)
                .map_err(|e| Error::StoreUnavailable(format!("failed to open l1 table: {e}")))?;
            let (start, end) = l1_prefix_range(&user);
            let count = table
                .range(start.as_str()..end.as_str())
                .map_err(|e| Error::StoreUnavailable(format!("failed to range l1 table: {e}")))?
                .count();
            Ok(count as u64)
        })
        .await
    }

    async fn lock_acquire(&self, key: &str, ttl: std::time::Duration) -> Result<LockOutcome> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin write transaction: {e}")))?;
            let outcome = {
                let mut locks = write_txn
                    .open_table(LOCKS_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open locks table: {e}")))?;
                let now = now_millis();
                let held = locks
                    .get(key.as_str())
                    .map_err(|e| Error::StoreUnavailable(format!("failed to read lock: {e}")))?
                    .map(|bytes| de::<LockEntry>(bytes.value()))
                    .transpose()?;
                if let Some(entry) = held {
                    if entry.expires_at_millis > now {
                        LockOutcome::Busy
                    } else {
                        let token = uuid::Uuid::new_v4().to_string();
                        let new_entry = LockEntry { token: token.clone(), expires_at_millis: now + ttl.as_millis() };
                        let bytes = ser(&new_entry)?;
                        locks
                            .insert(key.as_str(), bytes.as_slice())
                            .map_err(|e| Error::StoreUnavailable(format!("failed to write lock: {e}")))?;
                        LockOutcome::Acquired(token)
                    }
                } else {
                    let token = uuid::Uuid::new_v4().to_string();
                    let new_entry = LockEntry { token: token.clone(), expires_at_millis: now + ttl.as_millis() };
                    let bytes = ser(&new_entry)?;
                    locks
                        .insert(key.as_str(), bytes.as_slice())
                        .map_err(|e| Error::StoreUnavailable(format!("failed to write lock: {e}")))?;
                    LockOutcome::Acquired(token)
                }
            };
            write_txn
                .commit()
                .map_err(|e| Error::StoreUnavailable(format!("failed to commit lock acquire: {e}")))?;
            Ok(outcome)
        })
        .await
    }

    async fn lock_release(&self, key: &str, token: &str) -> Result<ReleaseOutcome> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        let token = token.to_string();
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::StoreUnavailable(format!("failed to begin write transaction: {e}")))?;
            let outcome = {
                let mut locks = write_txn
                    .open_table(LOCKS_TABLE)
                    .map_err(|e| Error::StoreUnavailable(format!("failed to open locks table: {e}")))?;
                let held = locks
                    .get(key.as_str())
                    .map_err(|e| Error::StoreUnavailable(format!("failed to read lock: {e}")))?
                    .map(|bytes| de::<LockEntry>(bytes.value()))
                    .transpose()?;
                match held {
                    Some(entry) if entry.token == token => {
                        locks
                            .remove(key.as_str())
                            .map_err(|e| Error::StoreUnavailable(format!("failed to remove lock: {e}")))?;
                        ReleaseOutcome::Released
                    }
                    _ => ReleaseOutcome::Stale,
                }
            };
            write_txn
                .commit()
                .map_err(|e| Error::StoreUnavailable(format!("failed to commit lock release: {e}")))?;
            Ok(outcome)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractal_memory_core::types::Episode;
    use std::collections::HashMap;

    #[tokio::test]
    async fn l0_append_and_read_round_trip() {
        let (store, _dir) = RedbVolatileStore::open_temp().await.unwrap();
        for i in 0..3 {
            let episode = Episode::new("u1", format!("msg {i}"), 0.5).unwrap();
            store.l0_append("u1", episode, 500).await.unwrap();
        }
        let read = store.l0_read("u1", 10).await.unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read[0].content, "msg 2");
        assert_eq!(store.l0_len("u1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn l0_append_evicts_oldest_past_cap() {
        let (store, _dir) = RedbVolatileStore::open_temp().await.unwrap();
        for i in 0..5 {
            let episode = Episode::new("u1", format!("msg {i}"), 0.5).unwrap();
            let overflowed = store.l0_append("u1", episode, 3).await.unwrap();
            if i >= 3 {
                assert!(overflowed);
            }
        }
        assert_eq!(store.l0_len("u1").await.unwrap(), 3);
        let read = store.l0_read("u1", 10).await.unwrap();
        let contents: Vec<_> = read.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 4", "msg 3", "msg 2"]);
    }

    #[tokio::test]
    async fn l0_range_pop_removes_oldest_first() {
        let (store, _dir) = RedbVolatileStore::open_temp().await.unwrap();
        for i in 0..4 {
            let episode = Episode::new("u1", format!("msg {i}"), 0.5).unwrap();
            store.l0_append("u1", episode, 500).await.unwrap();
        }
        let popped = store.l0_range_pop("u1", 2).await.unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(popped[0].content, "msg 0");
        assert_eq!(popped[1].content, "msg 1");
        assert_eq!(store.l0_len("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn l1_put_list_and_delete() {
        let (store, _dir) = RedbVolatileStore::open_temp().await.unwrap();
        let record = SessionRecord {
            session_id: "s1".to_string(),
            summary: "did things".to_string(),
            importance: 0.6,
            source_count: 3,
            created_at: chrono::Utc::now(),
            extra: HashMap::new(),
        };
        store.l1_put("u1", record).await.unwrap();
        assert_eq!(store.l1_len("u1").await.unwrap(), 1);
        let listed = store.l1_list("u1", 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        store.l1_delete("u1", "s1").await.unwrap();
        assert_eq!(store.l1_len("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lock_acquire_busy_then_release_allows_reacquire() {
        let (store, _dir) = RedbVolatileStore::open_temp().await.unwrap();
        let outcome = store.lock_acquire("lock1", std::time::Duration::from_secs(60)).await.unwrap();
        let token = match outcome {
            LockOutcome::Acquired(t) => t,
            LockOutcome::Busy => panic!("expected acquisition"),
        };
        let busy = store.lock_acquire("lock1", std::time::Duration::from_secs(60)).await.unwrap();
        assert_eq!(busy, LockOutcome::Busy);

        let release = store.lock_release("lock1", &token).await.unwrap();
        assert_eq!(release, ReleaseOutcome::Released);

        let reacquired = store.lock_acquire("lock1", std::time::Duration::from_secs(60)).await.unwrap();
        assert!(matches!(reacquired, LockOutcome::Acquired(_)));
    }

    #[tokio::test]
    async fn stale_token_release_reports_stale() {
        let (store, _dir) = RedbVolatileStore::open_temp().await.unwrap();
        store.lock_acquire("lock1", std::time::Duration::from_secs(60)).await.unwrap();
        let outcome = store.lock_release("lock1", "wrong-token").await.unwrap();
        assert_eq!(outcome, ReleaseOutcome::Stale);
    }
}
