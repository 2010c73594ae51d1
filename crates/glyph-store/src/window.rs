//! Durable sliding-window store.
//!
//! Each admitted hit is a `(key, ts)` row. One transaction prunes expired
//! rows, counts, inserts and peeks the oldest, so processes sharing the
//! file see one consistent window per key.

use async_trait::async_trait;
use glyph_resilience::{WindowSnapshot, WindowStore};
use std::sync::Arc;
use turso::params;

use crate::db::{Database, Result};

pub struct DurableWindowStore {
    db: Arc<Database>,
}

impl DurableWindowStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn record_tx(&self, key: &str, now_ms: u64, window_ms: u64, limit: u32) -> Result<WindowSnapshot> {
        let cutoff = now_ms.saturating_sub(window_ms) as i64;
        let now = now_ms as i64;

        let mut conn = self.db.connection().await;
        let tx = conn.transaction().await?;

        // Expired rows of every key go, which keeps idle keys from piling up
        tx.execute("DELETE FROM rate_hits WHERE ts <= ?", params![cutoff])
            .await?;

        let mut count: i64 = 0;
        let mut rows = tx
            .query("SELECT COUNT(*) FROM rate_hits WHERE key = ?", params![key.to_string()])
            .await?;
        if let Some(row) = rows.next().await? {
            count = row.get(0)?;
        }
        drop(rows);

        let admitted = count < i64::from(limit);
        if admitted {
            tx.execute(
                "INSERT INTO rate_hits (key, ts) VALUES (?, ?)",
                params![key.to_string(), now],
            )
            .await?;
            count += 1;
        }

        let mut oldest: Option<i64> = None;
        let mut rows = tx
            .query("SELECT MIN(ts) FROM rate_hits WHERE key = ?", params![key.to_string()])
            .await?;
        if let Some(row) = rows.next().await? {
            oldest = row.get(0)?;
        }
        drop(rows);

        tx.commit().await?;

        Ok(WindowSnapshot {
            count: count.max(0) as u32,
            oldest_ms: oldest.map(|ts| ts.max(0) as u64),
            admitted,
        })
    }
}

#[async_trait]
impl WindowStore for DurableWindowStore {
    async fn record(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        limit: u32,
    ) -> glyph_core::Result<WindowSnapshot> {
        Ok(self.record_tx(key, now_ms, window_ms, limit).await?)
    }

    fn name(&self) -> &str {
        "turso"
    }
}
