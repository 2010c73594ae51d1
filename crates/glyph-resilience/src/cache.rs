//! TTL + LRU result cache
//!
//! Bounded in both size and freshness. Recency order is kept in a
//! `BTreeMap` keyed by a monotonically increasing touch sequence, so the
//! least-recently-used entry is always the first key.

use glyph_core::{CacheConfig, Clock};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// One cached value
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: u64,
    touched: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// touch sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_touch: u64,
}

impl<V> Inner<V> {
    fn touch(&mut self, key: &str) {
        self.next_touch += 1;
        let seq = self.next_touch;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.touched);
            entry.touched = seq;
            self.order.insert(seq, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.touched);
        Some(entry)
    }
}

/// Size- and age-bounded cache, safe to share between requests
pub struct TtlLruCache<V> {
    inner: Mutex<Inner<V>>,
    max_items: usize,
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlLruCache<V> {
    pub fn new(max_items: usize, max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_touch: 0,
            }),
            max_items: max_items.max(1),
            max_age,
            clock,
        }
    }

    pub fn from_config(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.max_items, Duration::from_millis(config.max_age_ms), clock)
    }

    fn is_expired(&self, inserted_at: u64, now: u64) -> bool {
        now.saturating_sub(inserted_at) > self.max_age.as_millis() as u64
    }

    /// Fresh value for `key`, marking it most recently used
    ///
    /// An expired entry is evicted and reported as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        let inserted_at = inner.entries.get(key)?.inserted_at;
        if self.is_expired(inserted_at, now) {
            inner.remove(key);
            debug!("Cache entry expired: {}", key);
            return None;
        }

        inner.touch(key);
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`, evicting least-recently-used entries past capacity
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        inner.remove(&key);
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: now,
                touched: 0,
            },
        );
        inner.touch(&key);

        while inner.entries.len() > self.max_items {
            let Some((_, oldest)) = inner.order.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
            debug!("Cache evicted least recently used entry: {}", oldest);
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.lock().remove(key).map(|entry| entry.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry; returns how many were dropped
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry.inserted_at, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }
}

impl<V: Clone + Send + 'static> TtlLruCache<V> {
    /// Prune on a fixed interval in the background
    ///
    /// The task holds only a weak reference and exits once the cache is dropped.
    pub fn spawn_pruner(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let pruned = cache.prune_expired();
                if pruned > 0 {
                    debug!("Cache pruner removed {} expired entries", pruned);
                }
            }
        })
    }
}

/// Lower-case, trim and collapse internal whitespace
pub fn normalize_prompt(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable cache key from semantically meaningful fields
///
/// Field order does not matter; values are normalized, so requests that
/// differ only in spacing or case share a key.
///
/// ```
/// use glyph_resilience::make_key;
///
/// let a = make_key(&[("prompt", "Rocket  Logo"), ("size", "512x512")]);
/// let b = make_key(&[("size", "512x512"), ("prompt", "rocket logo")]);
/// assert_eq!(a, b);
/// ```
pub fn make_key(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<(&str, String)> = fields
        .iter()
        .map(|(name, value)| (*name, normalize_prompt(value)))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (name, value) in &sorted {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_core::ManualClock;

    fn cache(clock: &ManualClock, max_items: usize) -> TtlLruCache<String> {
        TtlLruCache::new(max_items, Duration::from_secs(60), Arc::new(clock.clone()))
    }

    #[test]
    fn test_get_returns_latest_set() {
        let clock = ManualClock::new(0);
        let c = cache(&clock, 4);

        assert_eq!(c.get("k"), None);
        c.set("k", "one".to_string());
        c.set("k", "two".to_string());
        assert_eq!(c.get("k").as_deref(), Some("two"));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_ttl_expiry_on_read() {
        let clock = ManualClock::new(0);
        let c = cache(&clock, 4);

        c.set("k", "v".to_string());
        clock.advance(Duration::from_secs(60));
        assert!(c.get("k").is_some());

        clock.advance(Duration::from_millis(1));
        assert_eq!(c.get("k"), None);
        assert!(!c.contains_key("k"));
    }

    #[test]
    fn test_access_does_not_refresh_ttl() {
        let clock = ManualClock::new(0);
        let c = cache(&clock, 4);

        c.set("k", "v".to_string());
        clock.advance(Duration::from_secs(40));
        assert!(c.get("k").is_some());
        clock.advance(Duration::from_secs(40));
        assert!(c.get("k").is_none());
    }

    #[test]
    fn test_evicts_least_recently_inserted() {
        let clock = ManualClock::new(0);
        let c = cache(&clock, 3);

        for key in ["a", "b", "c", "d"] {
            c.set(key, key.to_uppercase());
        }

        assert_eq!(c.len(), 3);
        assert!(c.get("a").is_none());
        for key in ["b", "c", "d"] {
            assert!(c.get(key).is_some());
        }
    }

    #[test]
    fn test_access_protects_from_eviction() {
        let clock = ManualClock::new(0);
        let c = cache(&clock, 3);

        c.set("a", "A".to_string());
        c.set("b", "B".to_string());
        c.set("c", "C".to_string());
        assert!(c.get("a").is_some());

        c.set("d", "D".to_string());
        assert!(c.get("b").is_none());
        assert!(c.get("a").is_some());
    }

    #[test]
    fn test_prune_expired() {
        let clock = ManualClock::new(0);
        let c = cache(&clock, 10);

        c.set("old", "1".to_string());
        clock.advance(Duration::from_secs(50));
        c.set("new", "2".to_string());
        clock.advance(Duration::from_secs(20));

        assert_eq!(c.prune_expired(), 1);
        assert_eq!(c.len(), 1);
        assert!(c.get("new").is_some());
    }

    #[test]
    fn test_remove() {
        let clock = ManualClock::new(0);
        let c = cache(&clock, 2);
        c.set("k", "v".to_string());
        assert_eq!(c.remove("k").as_deref(), Some("v"));
        assert!(c.is_empty());
    }

    #[tokio::test]
    async fn test_pruner_stops_when_cache_dropped() {
        let clock = ManualClock::new(0);
        let c = Arc::new(cache(&clock, 2));
        let handle = c.spawn_pruner(Duration::from_millis(5));
        drop(c);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("pruner should exit")
            .unwrap();
    }

    #[test]
    fn test_make_key_ignores_volatile_formatting() {
        let a = make_key(&[("prompt", "  Rocket Logo "), ("style", "flat")]);
        let b = make_key(&[("style", "FLAT"), ("prompt", "rocket   logo")]);
        let c = make_key(&[("prompt", "rocket logo"), ("style", "outline")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_normalize_prompt() {
        assert_eq!(normalize_prompt("  A\tRocket\n LOGO "), "a rocket logo");
    }
}
