//! Advisory directory locks
//!
//! A lock only constrains processes that take it. Every cleanup pass runs
//! inside [`with_dir_lock`], which keeps the lock fresh while the pass runs
//! and releases it on every exit path, including a dropped pass.

use async_trait::async_trait;
use glyph_core::{GlyphError, Result};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Name of the lock file placed inside the guarded directory
pub const LOCK_FILE_NAME: &str = ".glyph-janitor.lock";

/// Proof of ownership handed out by [`DirLock::try_acquire`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub owner: String,
}

impl LockToken {
    pub fn new() -> Self {
        Self {
            owner: format!("{}-{}", std::process::id(), uuid::Uuid::new_v4().simple()),
        }
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub trait DirLock: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// `Ok(None)` when someone else holds the lock
    async fn try_acquire(&self) -> Result<Option<LockToken>>;

    /// Release a lock previously returned by `try_acquire`
    async fn release(&self, token: LockToken) -> Result<()>;

    /// Extend a held lock so a long pass is not mistaken for a crashed one
    async fn refresh(&self, _token: &LockToken) -> Result<()> {
        Ok(())
    }

    /// How often a holder should call [`refresh`](Self::refresh); `None` never
    fn refresh_interval(&self) -> Option<Duration> {
        None
    }
}

/// Releases the token when dropped without an explicit release
struct HeldLock {
    lock: Arc<dyn DirLock>,
    token: Option<LockToken>,
}

impl HeldLock {
    async fn release(mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.lock.release(token).await {
                warn!("Failed to release {} lock: {}", self.lock.name(), e);
            }
        }
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        let token = match self.token.take() {
            Some(token) => token,
            None => return,
        };
        let lock = Arc::clone(&self.lock);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Pass dropped while holding {} lock, releasing", lock.name());
                handle.spawn(async move {
                    if let Err(e) = lock.release(token).await {
                        warn!("Failed to release {} lock: {}", lock.name(), e);
                    }
                });
            }
            Err(_) => warn!(
                "No runtime to release {} lock; left to stale takeover",
                lock.name()
            ),
        }
    }
}

/// Run `f` while holding `lock`
///
/// Returns `Ok(None)` without running `f` when the lock is held elsewhere.
/// The lock is refreshed on its backend's interval while `f` runs and is
/// released whether `f` succeeds, fails or is dropped. A failed release is
/// logged and left to stale takeover.
pub async fn with_dir_lock<F, Fut, T>(lock: Arc<dyn DirLock>, f: F) -> Result<Option<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let token = match lock.try_acquire().await? {
        Some(token) => token,
        None => return Ok(None),
    };
    let held = HeldLock {
        lock: Arc::clone(&lock),
        token: Some(token),
    };

    let work = f();
    tokio::pin!(work);

    let result = match lock.refresh_interval().filter(|every| !every.is_zero()) {
        Some(every) => {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    result = &mut work => break result,
                    _ = ticker.tick() => {
                        if let Some(token) = held.token.as_ref() {
                            if let Err(e) = lock.refresh(token).await {
                                warn!("Failed to refresh {} lock: {}", lock.name(), e);
                            }
                        }
                    }
                }
            }
        }
        None => work.await,
    };

    held.release().await;
    result.map(Some)
}

/// Single-node lock: an exclusively created file inside the directory
///
/// The holder touches the file every third of `stale_after`. A lock file
/// older than `stale_after` is assumed abandoned by a crashed pass and is
/// taken over.
#[derive(Debug, Clone)]
pub struct FileDirLock {
    path: PathBuf,
    stale_after: Duration,
}

impl FileDirLock {
    pub fn new(dir: impl AsRef<Path>, stale_after: Duration) -> Self {
        Self {
            path: dir.as_ref().join(LOCK_FILE_NAME),
            stale_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn create_exclusive(&self, token: &LockToken) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await?;
        file.write_all(token.owner.as_bytes()).await?;
        file.flush().await
    }

    /// The holder recorded in a stale lock file, `None` if the lock is live
    ///
    /// Holder and age come from one open handle so they describe the same file.
    async fn stale_holder(&self) -> Option<String> {
        let mut file = fs::File::open(&self.path).await.ok()?;
        let modified = file.metadata().await.and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age <= self.stale_after {
            return None;
        }
        let mut holder = String::new();
        file.read_to_string(&mut holder).await.ok()?;
        Some(holder)
    }

    async fn read_holder(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(holder) => Ok(Some(holder.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Move the stale lock aside; true only if what moved was that stale lock
    ///
    /// The rename is atomic, so of several takers only one moves any given
    /// file. A taker that saw the stale lock late may instead move a fresh
    /// lock created in the meantime; it notices the different holder and
    /// links the file back without clobbering anything.
    async fn retire_stale(&self, stale_holder: &str) -> Result<bool> {
        let tombstone = self.path.with_file_name(format!(
            "{}.{}.stale",
            LOCK_FILE_NAME,
            uuid::Uuid::new_v4().simple()
        ));
        match fs::rename(&self.path, &tombstone).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let moved = fs::read_to_string(&tombstone).await.unwrap_or_default();
        let retired = moved == stale_holder;
        if !retired {
            debug!("Lock changed hands during takeover, restoring it");
            if let Err(e) = fs::hard_link(&tombstone, &self.path).await {
                warn!("Could not restore {}: {}", self.path.display(), e);
            }
        }
        if let Err(e) = fs::remove_file(&tombstone).await {
            warn!("Could not remove {}: {}", tombstone.display(), e);
        }
        Ok(retired)
    }
}

#[async_trait]
impl DirLock for FileDirLock {
    fn name(&self) -> &str {
        "file"
    }

    async fn try_acquire(&self) -> Result<Option<LockToken>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let token = LockToken::new();
        match self.create_exclusive(&token).await {
            Ok(()) => {
                debug!("Acquired {}", self.path.display());
                return Ok(Some(token));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let stale_holder = match self.stale_holder().await {
            Some(holder) => holder,
            None => {
                debug!("{} is held by another pass", self.path.display());
                return Ok(None);
            }
        };

        if !self.retire_stale(&stale_holder).await? {
            return Ok(None);
        }
        warn!(
            "Took over stale lock {} from {}",
            self.path.display(),
            stale_holder.trim()
        );

        // Another process may win the race to recreate; that is a normal skip
        match self.create_exclusive(&token).await {
            Ok(()) => Ok(Some(token)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn release(&self, token: LockToken) -> Result<()> {
        let holder = match self.read_holder().await? {
            Some(holder) => holder,
            None => return Ok(()),
        };

        if holder != token.owner {
            return Err(GlyphError::Resource(format!(
                "{} is now held by {}, not releasing",
                self.path.display(),
                holder
            )));
        }

        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn refresh(&self, token: &LockToken) -> Result<()> {
        match self.read_holder().await? {
            Some(holder) if holder == token.owner => {}
            other => {
                return Err(GlyphError::Resource(format!(
                    "{} is no longer ours (holder {:?})",
                    self.path.display(),
                    other
                )))
            }
        }

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::File::options()
                .write(true)
                .open(&path)?
                .set_modified(SystemTime::now())
        })
        .await
        .map_err(|e| GlyphError::Resource(format!("lock refresh task failed: {}", e)))??;
        Ok(())
    }

    fn refresh_interval(&self) -> Option<Duration> {
        Some(self.stale_after / 3)
    }
}
