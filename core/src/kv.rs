//! The KV Store Facade (spec §4.2): a small typed surface over hash, set,
//! sorted-set, and list operations, implemented once against an in-memory
//! backend (for tests and single-process dev mode) and once against Redis
//! (`kv_redis`). Callers never see which backend is behind the trait object.

use crate::error::CoreResult;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Pooled, typed KV operations. Implementations MUST wait rather than fail
/// when their connection pool is saturated (backpressure, not rejection) and
/// MUST make connectivity failures observable via [`KvStore::is_available`]
/// so long-running loops (economy tick, auto-expansion) can suspend
/// themselves instead of spinning against a dead backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn hash_get(&self, key: &str, field: &str) -> CoreResult<Option<String>>;
    async fn hash_set(&self, key: &str, field: &str, value: String) -> CoreResult<()>;
    async fn hash_get_all(&self, key: &str) -> CoreResult<HashMap<String, String>>;
    async fn hash_del(&self, key: &str, field: &str) -> CoreResult<()>;

    async fn set_add(&self, key: &str, member: String) -> CoreResult<()>;
    async fn set_rem(&self, key: &str, member: &str) -> CoreResult<()>;
    async fn set_members(&self, key: &str) -> CoreResult<HashSet<String>>;

    async fn zset_add(&self, key: &str, member: String, score: f64) -> CoreResult<()>;
    async fn zset_rem(&self, key: &str, member: &str) -> CoreResult<()>;
    async fn zset_range(&self, key: &str, start: isize, stop: isize) -> CoreResult<Vec<String>>;

    /// Pushes to the head (most recent first) and returns the new length.
    async fn list_lpush(&self, key: &str, value: String) -> CoreResult<usize>;
    async fn list_ltrim(&self, key: &str, start: isize, stop: isize) -> CoreResult<()>;
    async fn list_lrange(&self, key: &str, start: isize, stop: isize) -> CoreResult<Vec<String>>;

    async fn exists(&self, key: &str) -> CoreResult<bool>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> CoreResult<()>;
    async fn ping(&self) -> CoreResult<()>;

    /// Cheap, non-blocking liveness flag maintained by the implementation
    /// from its most recent command outcomes. Not a substitute for `ping`,
    /// which actually round-trips.
    fn is_available(&self) -> bool;
}

/// In-memory implementation backing unit tests and the single-process dev
/// mode. Mirrors Redis semantics closely enough (LPUSH prepends, LTRIM keeps
/// an inclusive index range, ZRANGE returns ascending-score order) that
/// tests against it exercise the same contract the data layer relies on.
pub mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Storage {
        hashes: HashMap<String, HashMap<String, String>>,
        sets: HashMap<String, HashSet<String>>,
        zsets: HashMap<String, BTreeMap<String, f64>>,
        lists: HashMap<String, Vec<String>>,
    }

    #[derive(Default)]
    pub struct MemoryKv {
        storage: Mutex<Storage>,
    }

    impl MemoryKv {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl KvStore for MemoryKv {
        async fn hash_get(&self, key: &str, field: &str) -> CoreResult<Option<String>> {
            let storage = self.storage.lock().unwrap();
            Ok(storage
                .hashes
                .get(key)
                .and_then(|h| h.get(field))
                .cloned())
        }

        async fn hash_set(&self, key: &str, field: &str, value: String) -> CoreResult<()> {
            let mut storage = self.storage.lock().unwrap();
            storage
                .hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value);
            Ok(())
        }

        async fn hash_get_all(&self, key: &str) -> CoreResult<HashMap<String, String>> {
            let storage = self.storage.lock().unwrap();
            Ok(storage.hashes.get(key).cloned().unwrap_or_default())
        }

        async fn hash_del(&self, key: &str, field: &str) -> CoreResult<()> {
            let mut storage = self.storage.lock().unwrap();
            if let Some(h) = storage.hashes.get_mut(key) {
                h.remove(field);
            }
            Ok(())
        }

        async fn set_add(&self, key: &str, member: String) -> CoreResult<()> {
            let mut storage = self.storage.lock().unwrap();
            storage.sets.entry(key.to_string()).or_default().insert(member);
            Ok(())
        }

        async fn set_rem(&self, key: &str, member: &str) -> CoreResult<()> {
            let mut storage = self.storage.lock().unwrap();
            if let Some(s) = storage.sets.get_mut(key) {
                s.remove(member);
            }
            Ok(())
        }

        async fn set_members(&self, key: &str) -> CoreResult<HashSet<String>> {
            let storage = self.storage.lock().unwrap();
            Ok(storage.sets.get(key).cloned().unwrap_or_default())
        }

        async fn zset_add(&self, key: &str, member: String, score: f64) -> CoreResult<()> {
            let mut storage = self.storage.lock().unwrap();
            storage.zsets.entry(key.to_string()).or_default().insert(member, score);
            Ok(())
        }

        async fn zset_rem(&self, key: &str, member: &str) -> CoreResult<()> {
            let mut storage = self.storage.lock().unwrap();
            if let Some(z) = storage.zsets.get_mut(key) {
                z.remove(member);
            }
            Ok(())
        }

        async fn zset_range(&self, key: &str, start: isize, stop: isize) -> CoreResult<Vec<String>> {
            let storage = self.storage.lock().unwrap();
            let Some(z) = storage.zsets.get(key) else {
                return Ok(vec![]);
            };
            let mut entries: Vec<(String, f64)> =
                z.iter().map(|(m, s)| (m.clone(), *s)).collect();
            entries.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
            let range = range_indices(entries.len(), start, stop);
            Ok(entries[range].iter().map(|(m, _)| m.clone()).collect())
        }

        async fn list_lpush(&self, key: &str, value: String) -> CoreResult<usize> {
            let mut storage = self.storage.lock().unwrap();
            let list = storage.lists.entry(key.to_string()).or_default();
            list.insert(0, value);
            Ok(list.len())
        }

        async fn list_ltrim(&self, key: &str, start: isize, stop: isize) -> CoreResult<()> {
            let mut storage = self.storage.lock().unwrap();
            if let Some(list) = storage.lists.get_mut(key) {
                let range = range_indices(list.len(), start, stop);
                *list = list[range].to_vec();
            }
            Ok(())
        }

        async fn list_lrange(&self, key: &str, start: isize, stop: isize) -> CoreResult<Vec<String>> {
            let storage = self.storage.lock().unwrap();
            let Some(list) = storage.lists.get(key) else {
                return Ok(vec![]);
            };
            let range = range_indices(list.len(), start, stop);
            Ok(list[range].to_vec())
        }

        async fn exists(&self, key: &str) -> CoreResult<bool> {
            let storage = self.storage.lock().unwrap();
            Ok(storage.hashes.contains_key(key)
                || storage.sets.contains_key(key)
                || storage.zsets.contains_key(key)
                || storage.lists.contains_key(key))
        }

        async fn expire(&self, _key: &str, _ttl_secs: u64) -> CoreResult<()> {
            // TTLs are not observed by the in-memory backend; it only ever
            // backs tests and a single dev process, both short-lived.
            Ok(())
        }

        async fn ping(&self) -> CoreResult<()> {
            Ok(())
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    /// Applies Redis-style `start..=stop` index semantics (negative indices
    /// count from the end, inclusive both ends) and returns a usable `Range`.
    fn range_indices(len: usize, start: isize, stop: isize) -> std::ops::Range<usize> {
        let len = len as isize;
        if len == 0 {
            return 0..0;
        }
        let norm = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len - 1).max(0)
            }
        };
        let start = norm(start);
        let stop = norm(stop);
        if start > stop || start >= len {
            return 0..0;
        }
        start as usize..(stop as usize + 1)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn list_push_trim_range_matches_redis_semantics() {
            let kv = MemoryKv::new();
            for v in ["a", "b", "c"] {
                kv.list_lpush("events", v.to_string()).await.unwrap();
            }
            // LPUSH prepends, so most-recent-first: c, b, a.
            let all = kv.list_lrange("events", 0, -1).await.unwrap();
            assert_eq!(all, vec!["c", "b", "a"]);

            kv.list_ltrim("events", 0, 1).await.unwrap();
            let trimmed = kv.list_lrange("events", 0, -1).await.unwrap();
            assert_eq!(trimmed, vec!["c", "b"]);
        }

        #[tokio::test]
        async fn zset_range_is_score_ordered() {
            let kv = MemoryKv::new();
            kv.zset_add("active", "late".into(), 300.0).await.unwrap();
            kv.zset_add("active", "early".into(), 100.0).await.unwrap();
            kv.zset_add("active", "mid".into(), 200.0).await.unwrap();
            let ordered = kv.zset_range("active", 0, -1).await.unwrap();
            assert_eq!(ordered, vec!["early", "mid", "late"]);
        }

        #[tokio::test]
        async fn hash_set_and_get_round_trip() {
            let kv = MemoryKv::new();
            kv.hash_set("players:p1:data", "username", "alice".into())
                .await
                .unwrap();
            assert_eq!(
                kv.hash_get("players:p1:data", "username").await.unwrap(),
                Some("alice".to_string())
            );
            assert_eq!(kv.hash_get("players:p1:data", "missing").await.unwrap(), None);
        }
    }
}

pub use memory::MemoryKv;
