#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Generic in-memory TTL cache.
//!
//! Each instance has one fixed TTL; callers that need different expiry
//! windows for different payload kinds (live pollutant readings vs. facility
//! metadata) hold separate instances. Expiry is lazy: an expired entry is a
//! miss on read, and [`TtlCache::sweep`] optionally reclaims memory. There
//! is no background eviction loop.
//!
//! Instances are created by the process or test harness and handed to their
//! consumers explicitly — never stored in module-level globals.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// A stored value plus its insertion time.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
}

/// Key-value store where entries expire a fixed duration after insertion.
///
/// Safe for concurrent readers and writers; reads share an `RwLock` read
/// guard so lookups during a query fan-out do not block each other.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    /// Creates a cache whose entries expire `ttl` after insertion.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The fixed TTL of this instance.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Looks up a key. An entry older than the TTL is treated as absent —
    /// stale data is never returned.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().expect("cache lock poisoned");
        entries
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() <= self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Stores a value under `key` with the current timestamp, replacing any
    /// previous entry.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn put(&self, key: impl Into<String>, value: T) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Removes all expired entries and returns how many were reclaimed.
    ///
    /// Optional housekeeping — correctness never depends on it because
    /// [`TtlCache::get`] already treats expired entries as misses.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        let reclaimed = before - entries.len();
        if reclaimed > 0 {
            log::debug!("cache sweep reclaimed {reclaimed} expired entries");
        }
        reclaimed
    }

    /// Number of stored entries, including any not yet swept expired ones.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    /// Whether the cache holds no entries at all.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrites an entry's insertion time to `age` ago, so expiry paths can
    /// be tested without sleeping.
    #[cfg(test)]
    fn backdate(&self, key: &str, age: Duration) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        if let Some(entry) = entries.get_mut(key) {
            entry.inserted_at = Instant::now()
                .checked_sub(age)
                .expect("backdate age out of range");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.put("kl", vec![1, 2, 3]);

        assert_eq!(cache.get("kl"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get("penang"), None);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.put("kl", 42);
        cache.backdate("kl", Duration::from_secs(301));

        assert_eq!(cache.get("kl"), None);
        // Lazy expiry: the entry still occupies memory until swept.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn put_refreshes_insertion_time() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.put("kl", 1);
        cache.backdate("kl", Duration::from_secs(301));
        cache.put("kl", 2);

        assert_eq!(cache.get("kl"), Some(2));
    }

    #[test]
    fn sweep_reclaims_only_expired_entries() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.put("stale", 1);
        cache.put("fresh", 2);
        cache.backdate("stale", Duration::from_secs(400));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(2));
    }

    #[test]
    fn distinct_instances_have_distinct_ttls() {
        let live = TtlCache::<u8>::new(Duration::from_secs(300));
        let facilities = TtlCache::<u8>::new(Duration::from_secs(600));

        assert_eq!(live.ttl(), Duration::from_secs(300));
        assert_eq!(facilities.ttl(), Duration::from_secs(600));
    }
}
