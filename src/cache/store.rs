use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::CacheKey;

/// A single cached value together with the clock of the write that produced it
#[derive(Debug)]
struct CacheEntry {
    /// Serialized JSON of the cached value
    value: String,
    stored_at: Instant,
    /// `None` means cache until explicitly evicted
    ttl: Option<Duration>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.stored_at) > ttl,
            None => false,
        }
    }

    fn approximate_size(&self, key: &str) -> usize {
        key.len() + self.value.len() + std::mem::size_of::<CacheEntry>()
    }
}

/// Outcome of a single lookup, used for hit/miss accounting
enum Lookup {
    Hit(String),
    Miss,
    Expired,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    write_failures: AtomicU64,
}

struct CacheInner {
    entries: DashMap<String, CacheEntry>,
    counters: CacheCounters,
}

/// Snapshot of the cache for introspection endpoints and logs
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
    pub approximate_memory_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub write_failures: u64,
}

/// In-memory TTL cache shared by every upstream-calling component
///
/// Entries expire lazily on read; [`TtlCache::start_sweeper`] additionally purges
/// expired entries on a fixed interval so write-once keys do not pile up. The map is
/// sharded, so operations on distinct keys do not contend, and each `set` replaces the
/// value and its expiry clock in a single insert.
#[derive(Clone)]
pub struct TtlCache {
    inner: Arc<CacheInner>,
}

/// Handle for stopping the background sweep task
///
/// Dropping the handle also stops the sweeper, on its next wake-up.
pub struct CacheSweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheSweeperHandle {
    /// Signals the sweeper to stop and waits for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache sweeper task failed");
        }
        tracing::info!("Cache sweeper stopped");
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                counters: CacheCounters::default(),
            }),
        }
    }

    /// Spawns the periodic cleanup task
    ///
    /// The first sweep runs one full `interval` after start.
    pub fn start_sweeper(&self, interval: Duration) -> CacheSweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let cache = self.clone();

        let task = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Cache sweeper started");
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.cleanup();
                        if removed > 0 {
                            tracing::info!(
                                removed = removed,
                                remaining = cache.len(),
                                "Cache sweep evicted expired entries"
                            );
                        }
                    }
                    // Explicit shutdown, or every handle dropped
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        CacheSweeperHandle { shutdown_tx, task }
    }

    /// Stores a value, replacing any previous entry and its expiry
    ///
    /// Returns `false` if the value could not be serialized; the previous entry, if
    /// any, is left untouched in that case.
    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>) -> bool {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                self.inner.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Cache serialization error");
                return false;
            }
        };

        self.inner.entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                value: json,
                stored_at: Instant::now(),
                ttl,
            },
        );

        tracing::debug!(key = %key, ttl = ?ttl, "Cached value");
        true
    }

    /// Retrieves a value if present and not expired
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let now = Instant::now();
        let lookup = match self.inner.entries.get(key.as_str()) {
            Some(entry) if entry.is_expired(now) => Lookup::Expired,
            Some(entry) => Lookup::Hit(entry.value.clone()),
            None => Lookup::Miss,
        };

        match lookup {
            Lookup::Hit(json) => match serde_json::from_str(&json) {
                Ok(value) => {
                    self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, error = %e, "Cache deserialization error");
                    None
                }
            },
            Lookup::Expired => {
                // A concurrent set may have replaced the entry since the lookup
                self.inner
                    .entries
                    .remove_if(key.as_str(), |_, entry| entry.is_expired(now));
                self.inner.counters.expired.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "Cache entry expired");
                None
            }
            Lookup::Miss => {
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Removes a key, returning whether it was present
    pub fn delete(&self, key: &CacheKey) -> bool {
        let removed = self.inner.entries.remove(key.as_str()).is_some();
        if removed {
            tracing::debug!(key = %key, "Cache entry deleted");
        }
        removed
    }

    /// Drops every entry and returns how many were removed
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        self.inner.entries.retain(|_, _| {
            removed += 1;
            false
        });
        tracing::info!(removed, "Cache cleared");
        removed
    }

    /// Evicts every entry whose TTL has elapsed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.inner.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            self.inner
                .counters
                .expired
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys = Vec::with_capacity(self.inner.entries.len());
        let mut approximate_memory_bytes = 0;
        for entry in self.inner.entries.iter() {
            approximate_memory_bytes += entry.value().approximate_size(entry.key());
            keys.push(entry.key().clone());
        }
        keys.sort();

        let counters = &self.inner.counters;
        CacheStats {
            size: keys.len(),
            keys,
            approximate_memory_bytes,
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            expired: counters.expired.load(Ordering::Relaxed),
            write_failures: counters.write_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheNamespace;
    use serde::ser::Error as _;
    use serde_json::json;

    fn key(name: &str) -> CacheKey {
        CacheKey::new(CacheNamespace::QlooRecommendations, &[json!(name)])
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("cannot serialize"))
        }
    }

    #[test]
    fn test_set_and_get() {
        let cache = TtlCache::new();
        let value = vec!["e1".to_string(), "e2".to_string()];

        assert!(cache.set(&key("a"), &value, Some(Duration::from_secs(60))));
        let retrieved: Option<Vec<String>> = cache.get(&key("a"));
        assert_eq!(retrieved, Some(value));
    }

    #[test]
    fn test_cache_miss() {
        let cache = TtlCache::new();
        let retrieved: Option<Vec<String>> = cache.get(&key("nonexistent_key_12345"));
        assert_eq!(retrieved, None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_ttl_expiry_removes_entry() {
        let cache = TtlCache::new();
        cache.set(&key("short"), &"value", Some(Duration::from_millis(100)));

        std::thread::sleep(Duration::from_millis(150));

        let retrieved: Option<String> = cache.get(&key("short"));
        assert_eq!(retrieved, None);

        let stats = cache.stats();
        assert!(!stats.keys.contains(&key("short").to_string()));
        assert_eq!(stats.expired, 1);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let cache = TtlCache::new();
        cache.set(&key("forever"), &42u32, None);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.cleanup(), 0);
        assert_eq!(cache.get::<u32>(&key("forever")), Some(42));

        assert!(cache.delete(&key("forever")));
        assert_eq!(cache.get::<u32>(&key("forever")), None);
    }

    #[test]
    fn test_set_replaces_value_and_ttl() {
        let cache = TtlCache::new();
        cache.set(&key("k"), &"old", Some(Duration::from_millis(50)));
        cache.set(&key("k"), &"new", None);

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get::<String>(&key("k")), Some("new".to_string()));
    }

    #[test]
    fn test_serialization_failure_keeps_prior_value() {
        let cache = TtlCache::new();
        cache.set(&key("k"), &"prior", None);

        assert!(!cache.set(&key("k"), &Unserializable, None));
        assert_eq!(cache.get::<String>(&key("k")), Some("prior".to_string()));
        assert_eq!(cache.stats().write_failures, 1);
    }

    #[test]
    fn test_type_mismatch_is_a_miss() {
        let cache = TtlCache::new();
        cache.set(&key("k"), &"text", None);
        assert_eq!(cache.get::<Vec<u32>>(&key("k")), None);
    }

    #[test]
    fn test_delete_reports_presence() {
        let cache = TtlCache::new();
        cache.set(&key("k"), &1, None);
        assert!(cache.delete(&key("k")));
        assert!(!cache.delete(&key("k")));
    }

    #[test]
    fn test_clear_returns_removed_count() {
        let cache = TtlCache::new();
        for name in ["a", "b", "c"] {
            cache.set(&key(name), &name, None);
        }
        assert_eq!(cache.clear(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_evicts_only_expired() {
        let cache = TtlCache::new();
        cache.set(&key("stale"), &1, Some(Duration::from_millis(10)));
        cache.set(&key("fresh"), &2, Some(Duration::from_secs(60)));
        cache.set(&key("forever"), &3, None);

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.cleanup(), 1);
        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(
            stats.keys,
            vec![key("forever").to_string(), key("fresh").to_string()]
        );
    }

    #[test]
    fn test_stats_memory_estimate_grows() {
        let cache = TtlCache::new();
        let empty = cache.stats().approximate_memory_bytes;
        cache.set(&key("k"), &"x".repeat(1024), None);
        assert!(cache.stats().approximate_memory_bytes >= empty + 1024);
    }

    #[test]
    fn test_instances_are_independent() {
        let first = TtlCache::new();
        let second = TtlCache::new();
        first.set(&key("k"), &1, None);
        assert_eq!(second.get::<i32>(&key("k")), None);
    }

    #[tokio::test]
    async fn test_concurrent_writes_same_key_leave_one_value() {
        let cache = TtlCache::new();
        let mut tasks = Vec::new();

        for i in 0..32u32 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                cache.set(&key("shared"), &i, Some(Duration::from_secs(60)));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let value: Option<u32> = cache.get(&key("shared"));
        assert!(matches!(value, Some(v) if v < 32));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_purges_unread_keys() {
        let cache = TtlCache::new();
        cache.set(&key("write_once"), &"v", Some(Duration::from_millis(10)));

        let handle = cache.start_sweeper(Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(cache.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_shutdown_stops_task() {
        let cache = TtlCache::new();
        let handle = cache.start_sweeper(Duration::from_secs(300));
        tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_secs(1), handle.shutdown()).await
        );
    }
}
