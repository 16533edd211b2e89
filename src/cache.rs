//! # TTL Cache
//! Time-bounded cache used by every adapter and by the enrichment pipeline.
//!
//! Each component owns its own instance keyed in its own namespace; entries
//! are valid for a fixed duration from capture, lazily evicted on lookup and
//! bulk-evicted by an explicit `sweep` (driven externally on a cadence
//! independent of the TTL, so memory stays bounded without per-access cost).
//!
//! The clock is injected so tests can advance time without sleeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Time source in unix seconds. Injected so tests control expiry.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;
}

/// Wall-clock time source used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn at(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    captured_at: u64,
}

/// Observability snapshot exposed by the cache-stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// Mutex-guarded map of `key -> (value, captured_at)` with a fixed TTL.
///
/// Concurrent writes to the same key are idempotent: the last successful
/// fetch wins, and a slightly stale overwrite is tolerated.
pub struct TtlCache<T: Clone> {
    inner: Mutex<HashMap<String, CacheEntry<T>>>,
    ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

/// Default TTL shared by adapters and enrichment: 5 minutes.
pub const DEFAULT_TTL_SECS: u64 = 300;

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl_secs,
            clock,
        }
    }

    /// Cache with the default 5-minute TTL on the system clock.
    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL_SECS, Arc::new(SystemClock))
    }

    /// Fetch a live entry; an expired entry is removed on the way.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now_unix();
        let mut map = self.inner.lock().expect("ttl cache mutex poisoned");
        match map.get(key) {
            Some(e) if now.saturating_sub(e.captured_at) < self.ttl_secs => Some(e.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, value: T) {
        let now = self.clock.now_unix();
        let mut map = self.inner.lock().expect("ttl cache mutex poisoned");
        map.insert(
            key.to_string(),
            CacheEntry {
                value,
                captured_at: now,
            },
        );
    }

    /// Remove every expired entry. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_unix();
        let mut map = self.inner.lock().expect("ttl cache mutex poisoned");
        let before = map.len();
        map.retain(|_, e| now.saturating_sub(e.captured_at) < self.ttl_secs);
        before - map.len()
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("ttl cache mutex poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("ttl cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let map = self.inner.lock().expect("ttl cache mutex poisoned");
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: map.len(),
            keys,
        }
    }
}

/// Stable, cheap content hash for cache keys. Determinism within one process
/// is all that is required; stability across restarts is not.
pub fn content_key(input: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_clock(ttl: u64) -> (TtlCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(1_000));
        let cache = TtlCache::new(ttl, clock.clone());
        (cache, clock)
    }

    #[test]
    fn get_within_ttl_returns_value() {
        let (cache, clock) = cache_with_clock(300);
        cache.put("M1", "records".to_string());
        clock.advance(299);
        assert_eq!(cache.get("M1").as_deref(), Some("records"));
    }

    #[test]
    fn get_past_ttl_evicts_lazily() {
        let (cache, clock) = cache_with_clock(300);
        cache.put("M1", "records".to_string());
        clock.advance(300);
        assert!(cache.get("M1").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let (cache, clock) = cache_with_clock(300);
        cache.put("M1", "old".to_string());
        clock.advance(200);
        cache.put("N7", "new".to_string());
        clock.advance(150);
        assert_eq!(cache.sweep(), 1);
        assert!(cache.get("N7").is_some());
    }

    #[test]
    fn clear_empties_everything() {
        let (cache, _clock) = cache_with_clock(300);
        cache.put("M1", "a".to_string());
        cache.put("A1", "b".to_string());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn stats_lists_sorted_keys() {
        let (cache, _clock) = cache_with_clock(300);
        cache.put("N7", "a".to_string());
        cache.put("A1", "b".to_string());
        let s = cache.stats();
        assert_eq!(s.size, 2);
        assert_eq!(s.keys, vec!["A1".to_string(), "N7".to_string()]);
    }

    #[test]
    fn content_key_is_deterministic_and_sensitive() {
        assert_eq!(content_key("M1 heavy"), content_key("M1 heavy"));
        assert_ne!(content_key("M1 heavy"), content_key("M1 heavy!"));
    }
}
