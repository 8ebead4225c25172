//! TTL response store.
//!
//! Entries carry the absolute expiry fixed when they were written and the
//! invalidation group they belong to. Every operation runs under one mutex,
//! so `get`, `set` and `remove_by_name` observe a total order.

use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";
/// Expiry used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct Entry {
    expires_at: Instant,
    group: String,
    value: Value,
}

/// Bounded key to value store with per-entry expiry and group eviction.
pub struct TtlStore {
    entries: Mutex<LruCache<CacheKey, Entry>>,
}

impl TtlStore {
    /// Create a new store with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Return the value stored at `key` if it has not expired.
    ///
    /// `ttl` is the caller's current TTL and is only logged: freshness is
    /// judged against the expiry recorded by `set`, so a longer TTL cannot
    /// revive an entry written under a shorter one.
    pub fn get(&self, key: &CacheKey, ttl: Duration) -> Option<Value> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");

        let lookup = entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));
        let fresh = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                trace!(%key, "Dropped expired cache entry");
                None
            }
            None => None,
        };

        if fresh.is_some() {
            counter!("flux_contract_cache_hit_total").increment(1);
            trace!(%key, ttl_ms = ttl.as_millis() as u64, "Cache hit");
        } else {
            counter!("flux_contract_cache_miss_total").increment(1);
            trace!(%key, ttl_ms = ttl.as_millis() as u64, "Cache miss");
        }
        fresh
    }

    /// Store `value` at `key` until `now + ttl`, tagged with `group`.
    ///
    /// A TTL too large to represent keeps the entry for a century instead.
    pub fn set(&self, key: CacheKey, ttl: Duration, group: impl Into<String>, value: Value) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        let entry = Entry {
            expires_at,
            group: group.into(),
            value,
        };

        let evicted = mutex_lock(&self.entries, SOURCE, "set")
            .push(key, entry)
            .filter(|(evicted_key, _)| *evicted_key != key);
        if let Some((evicted_key, evicted_entry)) = evicted {
            counter!("flux_contract_cache_evict_total").increment(1);
            debug!(
                key = %evicted_key,
                group = %evicted_entry.group,
                "Evicted cache entry due to capacity"
            );
        }
    }

    /// Evict every entry tagged `group`, expired or not.
    ///
    /// Returns the number of entries removed.
    pub fn remove_by_name(&self, group: &str) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "remove_by_name");

        let doomed: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.group == group)
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            entries.pop(key);
        }

        if !doomed.is_empty() {
            counter!("flux_contract_cache_invalidate_total").increment(doomed.len() as u64);
        }
        debug!(group, evicted = doomed.len(), "Invalidated cache group");
        doomed.len()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }

    /// Get the number of stored entries, including ones that expired but were not read since.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use serde_json::json;

    use super::super::keys::derive_key;
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    fn key(url: &str) -> CacheKey {
        derive_key(url, None)
    }

    #[test]
    fn roundtrip_within_ttl() {
        let store = TtlStore::new(&CacheConfig::default());
        let k = key("/users/1");

        assert!(store.get(&k, TTL).is_none());
        store.set(k, TTL, "User", json!({"id": 1}));

        assert_eq!(store.get(&k, TTL), Some(json!({"id": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let store = TtlStore::new(&CacheConfig::default());
        let k = key("/users/1");
        store.set(k, TTL, "User", json!(1));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get(&k, TTL).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get(&k, TTL).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn longer_ttl_on_read_does_not_revive_entry() {
        let store = TtlStore::new(&CacheConfig::default());
        let k = key("/users/1");
        store.set(k, Duration::from_secs(1), "User", json!(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get(&k, Duration::from_secs(3600)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ttl_is_kept_instead_of_overflowing() {
        let store = TtlStore::new(&CacheConfig::default());
        let k = key("/users/1");
        store.set(k, Duration::from_secs(u64::MAX), "User", json!(1));

        tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
        assert_eq!(store.get(&k, TTL), Some(json!(1)));
    }

    #[test]
    fn set_overwrites_existing_entry() {
        let store = TtlStore::new(&CacheConfig::default());
        let k = key("/users/1");
        store.set(k, TTL, "User", json!("old"));
        store.set(k, TTL, "Other", json!("new"));

        assert_eq!(store.get(&k, TTL), Some(json!("new")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove_by_name("User"), 0);
        assert_eq!(store.remove_by_name("Other"), 1);
    }

    #[test]
    fn remove_by_name_only_touches_that_group() {
        let store = TtlStore::new(&CacheConfig::default());
        store.set(key("/a"), TTL, "Users", json!(1));
        store.set(key("/b"), TTL, "Users", json!(2));
        store.set(key("/c"), TTL, "Posts", json!(3));

        assert_eq!(store.remove_by_name("Users"), 2);
        assert!(store.get(&key("/a"), TTL).is_none());
        assert!(store.get(&key("/b"), TTL).is_none());
        assert_eq!(store.get(&key("/c"), TTL), Some(json!(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_by_name_includes_expired_entries() {
        let store = TtlStore::new(&CacheConfig::default());
        store.set(key("/a"), Duration::from_secs(1), "Users", json!(1));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(store.remove_by_name("Users"), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let store = TtlStore::new(&CacheConfig { capacity: 2 });
        store.set(key("/1"), TTL, "G", json!(1));
        store.set(key("/2"), TTL, "G", json!(2));

        assert!(store.get(&key("/1"), TTL).is_some());
        store.set(key("/3"), TTL, "G", json!(3));

        assert!(store.get(&key("/1"), TTL).is_some());
        assert!(store.get(&key("/2"), TTL).is_none());
        assert!(store.get(&key("/3"), TTL).is_some());
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = TtlStore::new(&CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .lock()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.set(key("/a"), TTL, "G", json!(1));
        assert!(store.get(&key("/a"), TTL).is_some());
    }
}
