//! Lease-based directory lock shared through the database.
//!
//! A lease expires on its own, so a pass that dies while holding it only
//! blocks other passes until `expires_at`. A live pass extends its lease
//! every third of the lease length.

use async_trait::async_trait;
use glyph_core::{Clock, GlyphError};
use glyph_janitor::{DirLock, LockToken};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use turso::params;

use crate::db::{Database, Result};

pub struct DurableDirLock {
    db: Arc<Database>,
    dir: String,
    lease: Duration,
    clock: Arc<dyn Clock>,
}

impl DurableDirLock {
    pub fn new(db: Arc<Database>, dir: impl Into<String>, lease: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            dir: dir.into(),
            lease,
            clock,
        }
    }

    async fn acquire_tx(&self, token: &LockToken) -> Result<bool> {
        let now = self.clock.now_ms() as i64;
        let expires_at = now.saturating_add(self.lease.as_millis() as i64);

        let mut conn = self.db.connection().await;
        let tx = conn.transaction().await?;

        tx.execute(
            "DELETE FROM dir_locks WHERE dir = ? AND expires_at <= ?",
            params![self.dir.clone(), now],
        )
        .await?;

        let mut holder: Option<String> = None;
        let mut rows = tx
            .query("SELECT owner FROM dir_locks WHERE dir = ?", params![self.dir.clone()])
            .await?;
        if let Some(row) = rows.next().await? {
            holder = Some(row.get(0)?);
        }
        drop(rows);

        let acquired = match holder {
            Some(owner) => {
                debug!("Lease on {} held by {}", self.dir, owner);
                false
            }
            None => {
                tx.execute(
                    "INSERT INTO dir_locks (dir, owner, expires_at) VALUES (?, ?, ?)",
                    params![self.dir.clone(), token.owner.clone(), expires_at],
                )
                .await?;
                true
            }
        };

        tx.commit().await?;
        Ok(acquired)
    }

    async fn release_tx(&self, token: &LockToken) -> Result<()> {
        let conn = self.db.connection().await;
        conn.execute(
            "DELETE FROM dir_locks WHERE dir = ? AND owner = ?",
            params![self.dir.clone(), token.owner.clone()],
        )
        .await?;
        Ok(())
    }

    /// Push `expires_at` out again; false when the lease is no longer ours
    async fn refresh_tx(&self, token: &LockToken) -> Result<bool> {
        let expires_at = (self.clock.now_ms() as i64).saturating_add(self.lease.as_millis() as i64);
        let conn = self.db.connection().await;
        let updated = conn
            .execute(
                "UPDATE dir_locks SET expires_at = ? WHERE dir = ? AND owner = ?",
                params![expires_at, self.dir.clone(), token.owner.clone()],
            )
            .await?;
        Ok(updated > 0)
    }
}

#[async_trait]
impl DirLock for DurableDirLock {
    fn name(&self) -> &str {
        "turso"
    }

    async fn try_acquire(&self) -> glyph_core::Result<Option<LockToken>> {
        let token = LockToken::new();
        if self.acquire_tx(&token).await? {
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, token: LockToken) -> glyph_core::Result<()> {
        Ok(self.release_tx(&token).await?)
    }

    async fn refresh(&self, token: &LockToken) -> glyph_core::Result<()> {
        if self.refresh_tx(token).await? {
            Ok(())
        } else {
            Err(GlyphError::Resource(format!(
                "lease on {} is no longer held by {}",
                self.dir, token.owner
            )))
        }
    }

    fn refresh_interval(&self) -> Option<Duration> {
        Some(self.lease / 3)
    }
}
