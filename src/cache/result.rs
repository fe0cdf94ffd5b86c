//! Bounded result cache with TTL expiry and strict LRU eviction.
//!
//! [`ResultCache`] stores successful [`ComponentResult`]s keyed by the
//! content hash from [`build_key`](super::build_key). Two independent
//! policies compose:
//!
//! - **TTL**: every entry carries its own `expires_at`. An expired entry is
//!   never returned as a hit; it is purged lazily when looked up, by
//!   [`ResultCache::purge_expired`], or by insertion pressure.
//! - **Size**: the sum of entry sizes never exceeds `max_bytes` after a
//!   mutation. When a [`put`](ResultCache::put) overflows the budget,
//!   entries are evicted least-recently-accessed first until it fits,
//!   including the entry just inserted if it alone is too large.
//!
//! # Recency index
//!
//! Each access stamps the entry with a monotonically increasing tick. A
//! `BTreeMap<tick, key>` orders entries by recency, so touching an entry
//! and evicting the oldest are both `O(log n)` with no scans.
//!
//! # Locking
//!
//! All state sits behind one `parking_lot::RwLock`. Lookups take the write
//! lock because a hit bumps the entry's recency and `hit_count`;
//! [`stats`](ResultCache::stats) and [`entry`](ResultCache::entry) only
//! read and run concurrently with each other.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::key::short;
use crate::telemetry;
use crate::types::ComponentResult;

/// Default cache capacity: 100 MB.
pub const DEFAULT_MAX_BYTES: usize = 100 * 1024 * 1024;

/// Configuration for the result cache.
///
/// ```rust
/// # use munin::CacheConfig;
/// let config = CacheConfig::new().max_bytes(16 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on the estimated size of all entries. Default: 100 MB.
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size budget in bytes.
    pub fn max_bytes(mut self, bytes: usize) -> Self {
        self.max_bytes = bytes;
        self
    }
}

/// Read-only snapshot of cache occupancy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub max_bytes: usize,
    /// `size_bytes / max_bytes`, in `0.0..=1.0`.
    pub utilization: f64,
    /// Sum of `hit_count` over live entries.
    pub total_hits: u64,
}

/// Inspection view of a single entry. Does not count as an access.
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub key: String,
    pub cached_at: Instant,
    /// `None` when the TTL is too large to represent.
    pub expires_at: Option<Instant>,
    pub hit_count: u64,
    pub size_bytes: usize,
}

struct CacheEntry {
    result: ComponentResult,
    cached_at: Instant,
    expires_at: Option<Instant>,
    hit_count: u64,
    size_bytes: usize,
    last_access: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    recency: BTreeMap<u64, String>,
    tick: u64,
    size_bytes: usize,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        self.size_bytes -= entry.size_bytes;
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        if let Some(entry) = self.entries.remove(&key) {
            self.size_bytes -= entry.size_bytes;
        }
        Some(key)
    }
}

/// Thread-safe, size-bounded, TTL-aware store of component results.
///
/// See module docs for eviction and locking.
pub struct ResultCache {
    inner: RwLock<Inner>,
    max_bytes: usize,
}

impl ResultCache {
    /// Create an empty cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_bytes: config.max_bytes,
        }
    }

    /// Look up a cached result.
    ///
    /// Returns `None` when the key is absent or its entry has expired (the
    /// expired entry is removed). A hit refreshes the entry's recency,
    /// increments its `hit_count` and returns a copy with `cache_hit` set.
    pub fn get(&self, key: &str) -> Option<ComponentResult> {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let expired = match inner.entries.get(key) {
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            inner.remove(key);
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired").increment(1);
            debug!(cache_key = short(key), "cache entry expired");
            return None;
        }

        let tick = inner.next_tick();
        let Inner {
            entries, recency, ..
        } = &mut *inner;
        let entry = entries.get_mut(key)?;
        recency.remove(&entry.last_access);
        recency.insert(tick, key.to_owned());
        entry.last_access = tick;
        entry.hit_count += 1;

        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        let mut result = entry.result.clone();
        result.cache_hit = true;
        Some(result)
    }

    /// Insert or replace an entry.
    ///
    /// No-op when `ttl` is zero. After insertion, least-recently-used
    /// entries are evicted until the size budget holds again.
    pub fn put(&self, key: &str, result: ComponentResult, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let size_bytes = key.len() + result.estimated_size();
        let now = Instant::now();

        let mut inner = self.inner.write();
        inner.remove(key);

        let tick = inner.next_tick();
        inner.recency.insert(tick, key.to_owned());
        inner.entries.insert(
            key.to_owned(),
            CacheEntry {
                result,
                cached_at: now,
                expires_at: now.checked_add(ttl),
                hit_count: 0,
                size_bytes,
                last_access: tick,
            },
        );
        inner.size_bytes += size_bytes;

        while inner.size_bytes > self.max_bytes {
            let Some(evicted) = inner.evict_oldest() else {
                break;
            };
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "lru").increment(1);
            debug!(
                cache_key = short(&evicted),
                size_bytes = inner.size_bytes,
                max_bytes = self.max_bytes,
                "evicted least recently used entry"
            );
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let removed = inner.entries.len();
        let tick = inner.tick;
        *inner = Inner {
            tick,
            ..Inner::default()
        };
        metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "clear")
            .increment(removed as u64);
    }

    /// Remove expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        if !expired.is_empty() {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired")
                .increment(expired.len() as u64);
        }
        expired.len()
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        let utilization = if self.max_bytes == 0 {
            0.0
        } else {
            inner.size_bytes as f64 / self.max_bytes as f64
        };
        CacheStats {
            entries: inner.entries.len(),
            size_bytes: inner.size_bytes,
            max_bytes: self.max_bytes,
            utilization,
            total_hits: inner.entries.values().map(|e| e.hit_count).sum(),
        }
    }

    /// Inspect an entry without touching its recency or hit count.
    ///
    /// Expired entries are still reported until they are purged.
    pub fn entry(&self, key: &str) -> Option<CacheEntryInfo> {
        let inner = self.inner.read();
        inner.entries.get(key).map(|entry| CacheEntryInfo {
            key: key.to_owned(),
            cached_at: entry.cached_at,
            expires_at: entry.expires_at,
            hit_count: entry.hit_count,
            size_bytes: entry.size_bytes,
        })
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured size budget.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
