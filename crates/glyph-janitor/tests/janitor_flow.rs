//! Integration tests for cleanup passes over a real directory.

use async_trait::async_trait;
use glyph_core::{JanitorConfig, ManualClock, Result};
use glyph_janitor::{DirLock, FileDirLock, Janitor, LockToken};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio::sync::Notify;

const HOUR: Duration = Duration::from_secs(3600);

fn config_for(dir: &Path) -> JanitorConfig {
    JanitorConfig {
        dir: dir.to_path_buf(),
        retention_ms: HOUR.as_millis() as u64,
        delete_backoff_ms: 1,
        ..Default::default()
    }
}

/// Create `name` with `len` bytes and an mtime `age` in the past
fn write_aged(dir: &Path, name: &str, len: usize, age: Duration) {
    let path = dir.join(name);
    std::fs::write(&path, vec![b'x'; len]).unwrap();
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_only_files_past_retention_are_deleted() {
    let temp = TempDir::new().unwrap();
    write_aged(temp.path(), "raster-old.png", 10, 2 * HOUR);
    write_aged(temp.path(), "vector-old.svg", 10, 3 * HOUR);
    write_aged(temp.path(), "raster-new.png", 10, Duration::from_secs(60));

    let janitor = Janitor::new(config_for(temp.path()));
    let report = janitor.run_once().await.unwrap();

    assert!(!report.skipped_locked);
    assert_eq!(report.expired_deleted, 2);
    assert_eq!(report.quota_deleted, 0);
    assert_eq!(report.bytes_freed, 20);
    assert_eq!(names(temp.path()), vec!["raster-new.png"]);
}

#[tokio::test]
async fn test_unlisted_prefixes_are_never_touched() {
    let temp = TempDir::new().unwrap();
    write_aged(temp.path(), "notes.txt", 10, 5 * HOUR);
    write_aged(temp.path(), "raster-old.png", 10, 5 * HOUR);
    std::fs::create_dir(temp.path().join("raster-dir")).unwrap();

    let janitor = Janitor::new(config_for(temp.path()));
    let report = janitor.run_once().await.unwrap();

    assert_eq!(report.expired_deleted, 1);
    assert_eq!(report.rejected, 2);
    assert_eq!(names(temp.path()), vec!["notes.txt", "raster-dir"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_is_rejected() {
    let outside = TempDir::new().unwrap();
    let victim = outside.path().join("precious.png");
    std::fs::write(&victim, b"keep me").unwrap();

    let temp = TempDir::new().unwrap();
    std::os::unix::fs::symlink(&victim, temp.path().join("raster-link.png")).unwrap();

    let janitor = Janitor::new(config_for(temp.path())).with_clock(Arc::new(ManualClock::new(
        (SystemTime::now() + 10 * HOUR)
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64,
    )));
    let report = janitor.run_once().await.unwrap();

    assert_eq!(report.deleted(), 0);
    assert!(victim.exists());
    assert!(temp.path().join("raster-link.png").symlink_metadata().is_ok());
}

#[tokio::test]
async fn test_directory_under_caps_keeps_files_of_any_age_within_retention() {
    let temp = TempDir::new().unwrap();
    // Staggered from one minute up to just inside the retention window
    let ages: [u64; 5] = [1, 15, 30, 45, 59];
    for (i, minutes) in ages.iter().enumerate() {
        write_aged(
            temp.path(),
            &format!("raster-{}.png", i),
            100,
            Duration::from_secs(minutes * 60),
        );
    }

    let config = JanitorConfig {
        max_bytes: 500,
        max_files: 5,
        ..config_for(temp.path())
    };
    let janitor = Janitor::new(config);
    let report = janitor.run_once().await.unwrap();

    assert_eq!(report.scanned, 5);
    assert_eq!(report.deleted(), 0);
    assert_eq!(names(temp.path()).len(), 5);
}

#[tokio::test]
async fn test_orphaned_staging_file_ages_out() {
    let temp = TempDir::new().unwrap();
    write_aged(
        temp.path(),
        "vector-20250101000000-abc.svg.tmp",
        1024 * 1024,
        48 * HOUR,
    );
    write_aged(temp.path(), "vector-20250101000000-def.svg.tmp", 10, Duration::from_secs(60));

    let janitor = Janitor::new(config_for(temp.path()));
    let report = janitor.run_once().await.unwrap();

    assert_eq!(report.rejected, 0);
    assert_eq!(report.expired_deleted, 1);
    assert_eq!(report.bytes_freed, 1024 * 1024);
    assert_eq!(names(temp.path()), vec!["vector-20250101000000-def.svg.tmp"]);
}

#[tokio::test]
async fn test_quota_deletes_oldest_first() {
    let temp = TempDir::new().unwrap();
    write_aged(temp.path(), "raster-a.png", 100, Duration::from_secs(40 * 60));
    write_aged(temp.path(), "raster-b.png", 100, Duration::from_secs(30 * 60));
    write_aged(temp.path(), "raster-c.png", 100, Duration::from_secs(20 * 60));
    write_aged(temp.path(), "raster-d.png", 100, Duration::from_secs(10 * 60));

    let config = JanitorConfig {
        max_bytes: 250,
        max_files: 3,
        ..config_for(temp.path())
    };
    let janitor = Janitor::new(config);
    let report = janitor.run_once().await.unwrap();

    assert_eq!(report.expired_deleted, 0);
    assert_eq!(report.quota_deleted, 2);
    assert_eq!(names(temp.path()), vec!["raster-c.png", "raster-d.png"]);
}

#[tokio::test]
async fn test_pass_is_skipped_while_locked() {
    let temp = TempDir::new().unwrap();
    write_aged(temp.path(), "raster-old.png", 10, 2 * HOUR);

    let holder = FileDirLock::new(temp.path(), HOUR);
    let token = holder.try_acquire().await.unwrap().unwrap();

    let janitor = Janitor::new(config_for(temp.path()));
    let report = janitor.run_once().await.unwrap();
    assert!(report.skipped_locked);
    assert!(temp.path().join("raster-old.png").exists());

    holder.release(token).await.unwrap();
    let report = janitor.run_once().await.unwrap();
    assert_eq!(report.expired_deleted, 1);
}

/// File lock that announces each acquisition
struct AnnouncingLock {
    inner: FileDirLock,
    acquired: Arc<Notify>,
}

#[async_trait]
impl DirLock for AnnouncingLock {
    fn name(&self) -> &str {
        "announcing"
    }

    async fn try_acquire(&self) -> Result<Option<LockToken>> {
        let token = self.inner.try_acquire().await?;
        if token.is_some() {
            self.acquired.notify_one();
        }
        Ok(token)
    }

    async fn release(&self, token: LockToken) -> Result<()> {
        self.inner.release(token).await
    }
}

#[tokio::test]
async fn test_pass_dropped_mid_sweep_releases_lock() {
    let temp = TempDir::new().unwrap();
    write_aged(temp.path(), "raster-old.png", 10, 2 * HOUR);

    let file_lock = FileDirLock::new(temp.path(), HOUR);
    let acquired = Arc::new(Notify::new());
    let janitor = Janitor::with_lock(
        config_for(temp.path()),
        Arc::new(AnnouncingLock {
            inner: file_lock.clone(),
            acquired: acquired.clone(),
        }),
    );

    // Abandon the pass as soon as it holds the lock
    tokio::select! {
        _ = janitor.run_once() => panic!("pass should have been abandoned"),
        _ = acquired.notified() => {}
    }

    let mut token = None;
    for _ in 0..50 {
        token = file_lock.try_acquire().await.unwrap();
        if token.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(token.is_some());
}

#[tokio::test]
async fn test_concurrent_passes_delete_each_file_once() {
    let temp = TempDir::new().unwrap();
    for i in 0..20 {
        write_aged(temp.path(), &format!("vector-{}.svg", i), 10, 2 * HOUR);
    }

    let a = Janitor::new(config_for(temp.path()));
    let b = Janitor::new(config_for(temp.path()));
    let (ra, rb) = tokio::join!(a.run_once(), b.run_once());
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ra.deleted() + rb.deleted(), 20);
    assert!(ra.deleted() == 0 || rb.deleted() == 0);
    assert_eq!(ra.failed + rb.failed, 0);
    assert!(names(temp.path()).is_empty());
}

#[tokio::test]
async fn test_scheduled_runs_until_stopped() {
    let temp = TempDir::new().unwrap();
    write_aged(temp.path(), "upload-old.bin", 10, 2 * HOUR);

    let janitor = Arc::new(Janitor::new(config_for(temp.path())));
    janitor.start_scheduled(Duration::from_millis(20));
    assert!(janitor.is_scheduled());

    for _ in 0..100 {
        if !temp.path().join("upload-old.bin").exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    janitor.stop().await;

    assert!(!janitor.is_scheduled());
    assert!(!temp.path().join("upload-old.bin").exists());
}
