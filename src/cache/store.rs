//! Keyed TTL store with capacity-bounded eviction
//!
//! Recency is tracked by re-insertion order: every `set` and every `get`
//! hit moves the key to the most-recent end, and a full cache evicts the
//! oldest remaining key.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

// ─────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored, expired or not
    pub total_size: usize,
    /// Entries whose expiry is still in the future
    pub valid_count: usize,
    /// Entries waiting for lazy or eager purge
    pub expired_count: usize,
    /// Capacity bound
    pub max_size: usize,
    /// valid / max(total, 1); an occupancy ratio, not a request hit ratio
    pub hit_rate: f64,
}

// ─────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// seq -> key; the first element is the least recently touched
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }

    fn touch(&mut self, key: &str) {
        let seq = self.bump();
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.seq);
            entry.seq = seq;
            self.order.insert(seq, key.to_string());
        }
    }
}

/// Thread-safe TTL cache
///
/// All mutation happens under a single lock, so readers never observe a
/// half-inserted or half-evicted entry.
#[derive(Debug)]
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    max_size: usize,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache bounded to `max_size` entries
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            max_size,
            default_ttl,
        }
    }

    /// Insert or replace a value; `ttl` falls back to the default
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        let mut inner = self.inner.lock();
        self.insert_locked(&mut inner, key, value, expires_at);
    }

    fn insert_locked(&self, inner: &mut Inner<V>, key: String, value: V, expires_at: Instant) {
        if inner.remove(&key).is_none() {
            while inner.entries.len() >= self.max_size {
                match inner.evict_oldest() {
                    Some(evicted) => trace!(key = %evicted, "Cache entry evicted"),
                    None => break,
                }
            }
        }

        let seq = inner.bump();
        inner.order.insert(seq, key.clone());
        inner.entries.insert(key, Entry { value, expires_at, seq });
    }

    /// Fetch a live value, purging it if expired
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => Instant::now() >= entry.expires_at,
        };

        if expired {
            inner.remove(key);
            return None;
        }

        inner.touch(key);
        inner.entries.get(key).map(|e| e.value.clone())
    }

    /// Check for a live value without refreshing its recency
    pub fn has(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            None => return false,
            Some(entry) => Instant::now() >= entry.expires_at,
        };
        if expired {
            inner.remove(key);
        }
        !expired
    }

    /// Remove a key, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Eagerly purge expired entries, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now >= e.expires_at)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    /// Keys with live values, least recently touched first
    pub fn valid_keys(&self) -> Vec<String> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .order
            .values()
            .filter(|k| inner.entries.get(*k).map_or(false, |e| now < e.expires_at))
            .cloned()
            .collect()
    }

    /// Insert only when no live value exists; returns true if inserted
    pub fn set_if_absent(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> bool {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.entries.get(&key) {
            Some(entry) if now < entry.expires_at => return false,
            Some(_) => {
                inner.remove(&key);
            }
            None => {}
        }
        self.insert_locked(&mut inner, key, value, now + ttl.unwrap_or(self.default_ttl));
        true
    }

    /// Fetch several keys; misses are omitted from the result
    pub fn get_many<'a, I>(&self, keys: I) -> HashMap<String, V>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter()
            .filter_map(|k| self.get(k).map(|v| (k.to_string(), v)))
            .collect()
    }

    /// Insert several entries in order
    pub fn set_many<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, V, Option<Duration>)>,
    {
        for (key, value, ttl) in entries {
            self.set(key, value, ttl);
        }
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.inner.lock();
        let total_size = inner.entries.len();
        let valid_count = inner.entries.values().filter(|e| now < e.expires_at).count();

        CacheStats {
            total_size,
            valid_count,
            expired_count: total_size - valid_count,
            max_size: self.max_size,
            hit_rate: valid_count as f64 / total_size.max(1) as f64,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
