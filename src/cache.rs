use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::engine::Query;

/// Deterministic identity of a query, independent of how its fields were
/// ordered or cased by the caller. Two requests that mean the same search
/// hash to the same fingerprint and therefore share a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// `mode` distinguishes `best_per_hotel` results from `hotel_detail`
    /// results for the same underlying query, e.g. `"best"` or
    /// `"detail:<hotel_id>"`.
    pub fn new(query: &Query, mode: &str) -> Self {
        let mut airports: Vec<String> = query.departure_airports.iter().map(|a| a.to_uppercase()).collect();
        airports.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(mode.as_bytes());
        hasher.update(b"|");
        hasher.update(airports.join(",").as_bytes());
        hasher.update(b"|");
        hasher.update(query.earliest_depart.to_le_bytes());
        hasher.update(query.latest_return.to_le_bytes());
        hasher.update(query.duration_nights.to_le_bytes());
        hasher.update([query.adults, query.children]);

        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// A bounded, TTL-expiring cache of query results, keyed by [`Fingerprint`].
///
/// Eviction is oldest-insertion-first, not least-recently-used: a
/// general-purpose LFU/LRU cache (e.g. `moka`) would evict by access
/// recency, which does not match the "drop whatever was cached longest ago"
/// policy this engine wants, so lookups are served from a [`DashMap`] while
/// insertion order is tracked separately in a [`Mutex`]-guarded deque.
pub struct ResultCache<V> {
    entries: DashMap<Fingerprint, CacheEntry<V>>,
    order: Mutex<VecDeque<Fingerprint>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { entries: DashMap::new(), order: Mutex::new(VecDeque::new()), ttl, max_entries }
    }

    /// Returns a clone of the cached value for `key`, or `None` if absent or
    /// expired. An expired entry is removed lazily on the next lookup or
    /// sweep rather than eagerly, so a burst of misses never blocks on a
    /// scan of the whole cache.
    pub fn get(&self, key: &Fingerprint) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Inserts or replaces the value for `key`. When inserting a genuinely
    /// new key pushes the cache over `max_entries`, evicts the oldest 10% of
    /// tracked entries first (rounded up to at least one).
    pub fn insert(&self, key: Fingerprint, value: V) {
        let is_new = !self.entries.contains_key(&key);
        self.entries.insert(key, CacheEntry { value, inserted_at: Instant::now() });
        if is_new {
            let mut order = self.order.lock();
            order.push_back(key);
            if order.len() > self.max_entries {
                let evict_count = (self.max_entries / 10).max(1);
                for _ in 0..evict_count {
                    if let Some(oldest) = order.pop_front() {
                        self.entries.remove(&oldest);
                    } else {
                        break;
                    }
                }
            }
        }
    }

    /// Drops every entry whose TTL has elapsed. Intended to be called
    /// periodically from a background task rather than relying solely on
    /// lazy expiry in `get`.
    pub fn sweep_expired(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.inserted_at.elapsed() <= self.ttl;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry unconditionally. The over-capacity release valve:
    /// surrendering this optional cache frees memory before an ingest retry,
    /// cheaper than letting the whole process fail.
    pub fn clear(&self) {
        self.entries.clear();
        self.order.lock().clear();
    }
}
