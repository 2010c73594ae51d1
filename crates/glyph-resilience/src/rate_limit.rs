//! Sliding-window request limiter
//!
//! Counts accepted requests per caller key inside a trailing window. The
//! window bookkeeping lives behind [`WindowStore`] so a durable store can
//! share limits across processes. Any failure of the durable store falls
//! back to an in-memory store for that hit: limiter infrastructure never
//! turns into a rejected request.

use async_trait::async_trait;
use glyph_core::{Clock, RateLimitConfig, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// State of one key's window after a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Accepted hits inside the window, including this one if admitted
    pub count: u32,
    /// Timestamp of the oldest accepted hit still in the window
    pub oldest_ms: Option<u64>,
    pub admitted: bool,
}

/// Per-key ordered timestamps
///
/// `record` must prune expired hits, count, insert `now_ms` only if the
/// count is under `limit`, and peek the oldest, as one atomic unit.
#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn record(&self, key: &str, now_ms: u64, window_ms: u64, limit: u32) -> Result<WindowSnapshot>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// In-process window store
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    windows: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }

    /// Drop hits older than the window for every key
    pub fn sweep(&self, now_ms: u64, window_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(window_ms);
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, hits| {
            while hits.front().is_some_and(|&ts| ts <= cutoff) {
                hits.pop_front();
            }
            !hits.is_empty()
        });
        before - windows.len()
    }

    fn record_sync(&self, key: &str, now_ms: u64, window_ms: u64, limit: u32) -> WindowSnapshot {
        let cutoff = now_ms.saturating_sub(window_ms);
        let mut windows = self.windows.lock();
        let hits = windows.entry(key.to_string()).or_default();

        while hits.front().is_some_and(|&ts| ts <= cutoff) {
            hits.pop_front();
        }

        let admitted = (hits.len() as u32) < limit;
        if admitted {
            hits.push_back(now_ms);
        }

        let snapshot = WindowSnapshot {
            count: hits.len() as u32,
            oldest_ms: hits.front().copied(),
            admitted,
        };
        if hits.is_empty() {
            windows.remove(key);
        }
        snapshot
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn record(&self, key: &str, now_ms: u64, window_ms: u64, limit: u32) -> Result<WindowSnapshot> {
        Ok(self.record_sync(key, now_ms, window_ms, limit))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Limiter verdict, reported whether or not the call was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the oldest hit in the window expires
    pub reset_seconds: u64,
    /// Set on denial, equal to `reset_seconds`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Sliding-window limiter over a primary store with in-memory fallback
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    primary: Option<Arc<dyn WindowStore>>,
    fallback: MemoryWindowStore,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// In-memory limiter
    pub fn new(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            primary: None,
            fallback: MemoryWindowStore::new(),
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_millis(config.window_ms),
            clock,
        )
    }

    /// Prefer `store`, falling back to memory when it errors
    pub fn with_store(mut self, store: Arc<dyn WindowStore>) -> Self {
        self.primary = Some(store);
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request for `key` and report the verdict
    pub async fn admit(&self, key: &str) -> Admission {
        let now = self.clock.now_ms();
        let window_ms = self.window.as_millis() as u64;

        let snapshot = match &self.primary {
            Some(store) => match store.record(key, now, window_ms, self.limit).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(
                        "Rate limit store '{}' failed, using in-memory window: {}",
                        store.name(),
                        e
                    );
                    self.fallback.record_sync(key, now, window_ms, self.limit)
                }
            },
            None => self.fallback.record_sync(key, now, window_ms, self.limit),
        };

        let reset_seconds = snapshot
            .oldest_ms
            .map(|oldest| {
                let reset_ms = (oldest + window_ms).saturating_sub(now);
                reset_ms.div_ceil(1000).max(1)
            })
            .unwrap_or(0);

        Admission {
            allowed: snapshot.admitted,
            limit: self.limit,
            remaining: self.limit.saturating_sub(snapshot.count),
            reset_seconds,
            retry_after: (!snapshot.admitted).then_some(reset_seconds),
        }
    }

    /// Prune expired in-memory windows; returns keys dropped
    pub fn sweep(&self) -> usize {
        self.fallback
            .sweep(self.clock.now_ms(), self.window.as_millis() as u64)
    }
}
