//! Bounded key-value cache with per-entry expiry and LRU eviction.
//!
//! Expired entries are purged lazily when read; there is no background
//! sweeper. When the cache is full and a new key arrives, the least recently
//! used entry is evicted. Eviction, expiry, replacement and `clear` all drop
//! the stored value, so a value type that wipes itself on drop (for example
//! `zeroize::Zeroizing`) is wiped at every one of those points.
//!
//! The cache is not internally synchronized. Owners that share it across
//! tasks wrap it in a lock.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

/// A cached value plus its bookkeeping.
#[derive(Debug)]
pub struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    access_count: u64,
    last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    /// The cached value.
    #[must_use]
    pub const fn value(&self) -> &V {
        &self.value
    }

    /// Absolute instant after which the entry is treated as absent.
    #[must_use]
    pub const fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Number of successful reads.
    #[must_use]
    pub const fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Instant of the last successful read, or of insertion.
    #[must_use]
    pub const fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that returned a live value
    pub hits: u64,
    /// Reads that found nothing or an expired value
    pub misses: u64,
    /// Entries dropped to make room for a new key
    pub evictions: u64,
    /// Entries dropped because they were read after expiry
    pub expirations: u64,
}

/// LRU cache with a uniform time-to-live.
pub struct LruTtlCache<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    ttl: Duration,
    stats: CacheStats,
}

impl<K: Hash + Eq, V> LruTtlCache<K, V> {
    /// Create a cache holding at most `max_size` entries, each living `ttl`.
    #[must_use]
    pub fn new(max_size: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(max_size),
            ttl,
            stats: CacheStats::default(),
        }
    }

    /// Look up a live value and refresh its recency.
    ///
    /// An entry read after its expiry is removed and reported as a miss.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = Instant::now();
        let expired = match self.entries.peek(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.entries.pop(key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed = now;
        self.stats.hits += 1;
        Some(&entry.value)
    }

    /// Inspect an entry without touching its recency or counters.
    #[must_use]
    pub fn peek_entry(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.peek(key)
    }

    /// Insert or replace a value.
    ///
    /// If the cache is full and `key` is new, exactly one entry (the least
    /// recently used) is evicted first.
    pub fn set(&mut self, key: K, value: V) {
        let now = Instant::now();
        let replacing = self.entries.contains(&key);
        let entry = CacheEntry {
            value,
            expires_at: now + self.ttl,
            access_count: 0,
            last_accessed: now,
        };

        if self.entries.push(key, entry).is_some() && !replacing {
            self.stats.evictions += 1;
        }
    }

    /// Remove an entry, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key).map(|entry| entry.value)
    }

    /// Whether a live entry exists. Does not refresh recency.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired-but-unread ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.entries.cap().get()
    }

    /// Time-to-live applied on insertion.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Snapshot of the counters.
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }
}
