//! In-memory expiring cache for normalized upstream metadata.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

/// Defines how a call interacts with the metadata cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present;
    /// otherwise, fetch from upstream and write the response to the cache. (Default)
    #[default]
    Use,
    /// Always fetch from upstream, bypassing any cached entry,
    /// and write the new response to the cache.
    Refresh,
    /// Always fetch from upstream and do not read from or write to the cache.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

#[derive(Debug)]
struct CacheInner<K, V> {
    map: HashMap<K, CacheEntry<V>>,
    ttl: Duration,
    capacity: Option<usize>,
}

impl<K, V> CacheInner<K, V>
where
    K: Eq + Hash + Clone,
{
    fn is_fresh(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) < self.ttl
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.map.remove(&key);
        }
    }
}

/// Thread-safe key-value store whose entries expire `ttl` after they were stored.
///
/// Expired entries are purged when they are looked up; [`TtlCache::purge_expired`]
/// sweeps the whole map on demand.
pub struct TtlCache<K, V> {
    inner: Arc<RwLock<CacheInner<K, V>>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache").finish_non_exhaustive()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new cache with the given TTL and no capacity bound.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
                ttl,
                capacity: None,
            })),
        }
    }

    /// Create a cache that evicts the oldest entry once `capacity` keys are stored.
    pub fn with_capacity_limit(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
                ttl,
                capacity: Some(capacity.max(1)),
            })),
        }
    }

    /// Create a disabled cache. Every `set` is a no-op.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Get a clone of the value for `key` if it exists and hasn't expired.
    ///
    /// An expired entry is removed before `None` is returned, so a later
    /// lookup can never resurrect it.
    pub async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        {
            let store = self.inner.read().await;
            match store.map.get(key) {
                None => return None,
                Some(entry) if store.is_fresh(entry, now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut store = self.inner.write().await;
        // Another writer may have replaced the entry between the two locks.
        let expired = store
            .map
            .get(key)
            .is_some_and(|entry| !store.is_fresh(entry, now));
        if expired {
            store.map.remove(key);
            return None;
        }
        store.map.get(key).map(|entry| entry.value.clone())
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub async fn set(&self, key: K, value: V) {
        let mut store = self.inner.write().await;

        if store.ttl == Duration::ZERO {
            return;
        }

        if let Some(capacity) = store.capacity {
            if !store.map.contains_key(&key) && store.map.len() >= capacity {
                store.evict_oldest();
            }
        }

        store.map.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Remove `key`. Removing a missing key is a no-op.
    pub async fn delete<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.write().await.map.remove(key);
    }

    /// Remove every expired entry and return how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.inner.write().await;
        let ttl = store.ttl;
        let before = store.map.len();
        store
            .map
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) < ttl);
        before - store.map.len()
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of stored entries, including expired entries not yet purged.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn ttl(&self) -> Duration {
        self.inner.read().await.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = TtlCache::new(Duration::from_secs(1));

        assert!(cache.get("key1").await.is_none());

        cache.set(String::from("key1"), String::from("value1")).await;
        assert_eq!(cache.get("key1").await, Some(String::from("value1")));

        cache.set(String::from("key1"), String::from("value2")).await;
        assert_eq!(cache.get("key1").await, Some(String::from("value2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_served_until_ttl_and_not_after() {
        let cache = TtlCache::new(TTL);
        cache.set(7_u32, "song").await;

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert_eq!(cache.get(&7).await, Some("song"));

        tokio::time::advance(Duration::from_millis(2)).await;
        assert_eq!(cache.get(&7).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_purged_on_read_and_never_resurrected() {
        let cache = TtlCache::new(TTL);
        cache.set(1_u32, 10_u32).await;

        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        assert_eq!(cache.get(&1).await, None);
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.get(&1).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_restarts_ttl() {
        let cache = TtlCache::new(TTL);
        cache.set(1_u32, "old").await;

        tokio::time::advance(TTL / 2).await;
        cache.set(1_u32, "new").await;

        tokio::time::advance(TTL / 2 + Duration::from_millis(1)).await;
        assert_eq!(cache.get(&1).await, Some("new"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cache = TtlCache::new(TTL);
        cache.set(1_u32, "a").await;

        cache.delete(&1).await;
        cache.delete(&1).await;

        assert!(cache.get(&1).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_sweeps_only_stale_entries() {
        let cache = TtlCache::new(Duration::from_millis(100));
        cache.set(1_u32, "stale").await;

        tokio::time::advance(Duration::from_millis(60)).await;
        cache.set(2_u32, "fresh").await;

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&2).await, Some("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_limit_evicts_oldest_entry() {
        let cache = TtlCache::with_capacity_limit(TTL, 2);
        cache.set("a", 1).await;
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.set("b", 2).await;
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.set("c", 3).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let cache = TtlCache::disabled();

        cache.set(String::from("key1"), String::from("value1")).await;
        assert!(cache.get("key1").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[test]
    fn test_cache_mode_default() {
        let mode: CacheMode = Default::default();
        assert_eq!(mode, CacheMode::Use);
        assert!(!CacheMode::Refresh.reads());
        assert!(CacheMode::Refresh.writes());
        assert!(!CacheMode::Bypass.writes());
    }
}
