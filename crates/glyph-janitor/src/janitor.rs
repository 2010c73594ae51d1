use glyph_core::fail_open::fail_open_with_retries;
use glyph_core::{system_clock, Clock, GlyphError, JanitorConfig, Result};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::lock::{with_dir_lock, DirLock, FileDirLock, LOCK_FILE_NAME};

/// A deletion candidate found by a directory scan
#[derive(Debug, Clone)]
pub struct TempFileRecord {
    pub name: String,
    pub path: PathBuf,
    /// Modification time in ms since the Unix epoch
    pub modified_ms: u64,
    pub size: u64,
}

/// What one cleanup pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// The lock was held elsewhere; nothing was scanned
    pub skipped_locked: bool,
    pub scanned: usize,
    pub rejected: usize,
    pub expired_deleted: usize,
    pub quota_deleted: usize,
    pub failed: usize,
    pub bytes_freed: u64,
}

impl CleanupReport {
    pub fn deleted(&self) -> usize {
        self.expired_deleted + self.quota_deleted
    }

    fn skipped() -> Self {
        Self {
            skipped_locked: true,
            ..Default::default()
        }
    }
}

/// Scale `interval` by a random factor in `[1 - ratio, 1 + ratio]`
pub fn jittered(interval: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return interval;
    }
    let factor = rand::thread_rng().gen_range((1.0 - ratio)..=(1.0 + ratio));
    interval.mul_f64(factor)
}

struct Schedule {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Reclaims space in one shared artifact directory
pub struct Janitor {
    config: JanitorConfig,
    lock: Arc<dyn DirLock>,
    clock: Arc<dyn Clock>,
    schedule: Mutex<Option<Schedule>>,
}

impl Janitor {
    /// Janitor guarded by the exclusive-create file lock
    pub fn new(config: JanitorConfig) -> Self {
        let lock = Arc::new(FileDirLock::new(
            &config.dir,
            Duration::from_millis(config.stale_lock_ms),
        ));
        Self::with_lock(config, lock)
    }

    pub fn with_lock(config: JanitorConfig, lock: Arc<dyn DirLock>) -> Self {
        Self {
            config,
            lock,
            clock: system_clock(),
            schedule: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Run one cleanup pass
    ///
    /// Returns a skipped report, not an error, when another pass holds the lock.
    pub async fn run_once(&self) -> Result<CleanupReport> {
        if !tokio::fs::try_exists(&self.config.dir).await? {
            debug!("{} does not exist yet, nothing to clean", self.config.dir.display());
            return Ok(CleanupReport::default());
        }

        let report = with_dir_lock(Arc::clone(&self.lock), || self.sweep()).await?;
        match report {
            Some(report) => {
                info!(
                    "Cleanup of {}: scanned {}, deleted {} ({} expired, {} over quota), freed {} bytes, {} failed",
                    self.config.dir.display(),
                    report.scanned,
                    report.deleted(),
                    report.expired_deleted,
                    report.quota_deleted,
                    report.bytes_freed,
                    report.failed
                );
                Ok(report)
            }
            None => {
                warn!(
                    "Skipping cleanup of {}: {} lock held by another pass",
                    self.config.dir.display(),
                    self.lock.name()
                );
                Ok(CleanupReport::skipped())
            }
        }
    }

    async fn sweep(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let mut candidates = self.scan(&mut report).await?;

        let now = self.clock.now_ms();
        let retention_ms = self.config.retention_ms;
        let (expired, mut survivors): (Vec<_>, Vec<_>) = candidates
            .drain(..)
            .partition(|f| now.saturating_sub(f.modified_ms) > retention_ms);

        for file in &expired {
            if self.delete(file).await {
                report.expired_deleted += 1;
                report.bytes_freed += file.size;
            } else {
                report.failed += 1;
            }
        }

        survivors.sort_by_key(|f| f.modified_ms);
        let mut total_bytes: u64 = survivors.iter().map(|f| f.size).sum();
        let mut total_files = survivors.len();

        for file in &survivors {
            if total_bytes <= self.config.max_bytes && total_files <= self.config.max_files {
                break;
            }
            if self.delete(file).await {
                report.quota_deleted += 1;
                report.bytes_freed += file.size;
                total_bytes = total_bytes.saturating_sub(file.size);
                total_files -= 1;
            } else {
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// List entries that pass every admission check
    async fn scan(&self, report: &mut CleanupReport) -> Result<Vec<TempFileRecord>> {
        let base = tokio::fs::canonicalize(&self.config.dir).await?;
        let mut entries = tokio::fs::read_dir(&base).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            // The lock file and takeover tombstones
            if entry.file_name().to_string_lossy().starts_with(LOCK_FILE_NAME) {
                continue;
            }
            report.scanned += 1;
            match self.admit(&base, &entry).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => report.rejected += 1,
                Err(e) => {
                    debug!("Rejecting {}: {}", entry.path().display(), e);
                    report.rejected += 1;
                }
            }
        }

        Ok(records)
    }

    async fn admit(
        &self,
        base: &Path,
        entry: &tokio::fs::DirEntry,
    ) -> Result<Option<TempFileRecord>> {
        let path = entry.path();
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => {
                debug!("Rejecting non-UTF-8 name {}", path.display());
                return Ok(None);
            }
        };

        // symlink_metadata so a symlink is never treated as the file it points at
        let meta = tokio::fs::symlink_metadata(&path).await?;
        if !meta.file_type().is_file() {
            debug!("Rejecting {}: not a plain file", name);
            return Ok(None);
        }

        if !self
            .config
            .allowed_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
        {
            debug!("Rejecting {}: prefix not allowed", name);
            return Ok(None);
        }

        let canonical = tokio::fs::canonicalize(&path).await?;
        if canonical.parent() != Some(base) {
            debug!("Rejecting {}: resolves outside {}", name, base.display());
            return Ok(None);
        }

        let modified_ms = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(Some(TempFileRecord {
            name,
            path: canonical,
            modified_ms,
            size: meta.len(),
        }))
    }

    /// Delete with retries; true when the file is gone afterwards
    async fn delete(&self, file: &TempFileRecord) -> bool {
        let label = format!("remove {}", file.name);
        let removed = fail_open_with_retries(
            &label,
            || {
                let path = file.path.clone();
                async move {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => Ok(()),
                        // Already gone, e.g. removed by the artifact's owner
                        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                        Err(e) => Err(GlyphError::Resource(format!("{}: {}", path.display(), e))),
                    }
                }
            },
            self.config.delete_attempts.max(1),
            Duration::from_millis(self.config.delete_backoff_ms),
        )
        .await;

        if removed.is_some() {
            debug!("Deleted {} ({} bytes)", file.name, file.size);
            true
        } else {
            warn!("Giving up on {} for this pass", file.name);
            false
        }
    }

    /// Run cleanup passes every `interval` (±jitter) until [`stop`](Self::stop)
    ///
    /// Calling this while a schedule is already running restarts it.
    pub fn start_scheduled(self: &Arc<Self>, interval: Duration) {
        self.stop_schedule();

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let janitor = Arc::clone(self);
        let ratio = self.config.jitter_ratio;

        let handle = tokio::spawn(async move {
            info!(
                "Janitor scheduled for {} every {}s",
                janitor.config.dir.display(),
                interval.as_secs()
            );
            loop {
                let delay = jittered(interval, ratio);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                if let Err(e) = janitor.run_once().await {
                    error!("Cleanup pass failed: {}", e);
                }
            }
            debug!("Janitor schedule stopped");
        });

        *self.schedule.lock() = Some(Schedule { shutdown, handle });
    }

    /// Stop the scheduled runs and wait for an in-flight pass to finish
    pub async fn stop(&self) {
        let schedule = self.schedule.lock().take();
        if let Some(schedule) = schedule {
            info!("Stopping janitor");
            let _ = schedule.shutdown.send(true);
            if let Err(e) = schedule.handle.await {
                if !e.is_cancelled() {
                    error!("Janitor task ended abnormally: {}", e);
                }
            }
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule.lock().is_some()
    }

    fn stop_schedule(&self) {
        if let Some(schedule) = self.schedule.lock().take() {
            let _ = schedule.shutdown.send(true);
        }
    }
}
