//! Integration tests for the durable backends
//!
//! - Window pruning, admission and reset through the limiter
//! - Two limiters on one database file share a window
//! - Lease exclusion, release and expiry

use glyph_core::{JanitorConfig, ManualClock};
use glyph_janitor::{DirLock, Janitor};
use glyph_resilience::{RateLimiter, WindowStore};
use glyph_store::{Database, DurableDirLock, DurableWindowStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const MINUTE: Duration = Duration::from_secs(60);

async fn open_db(temp: &TempDir) -> Arc<Database> {
    let db = Database::open(temp.path().join("state.db"))
        .await
        .expect("Failed to open database");
    Arc::new(db)
}

#[tokio::test]
async fn test_schema_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    db.init_schema().await.unwrap();
    assert_eq!(db.hit_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_window_admits_up_to_limit() {
    let temp = TempDir::new().unwrap();
    let store = DurableWindowStore::new(open_db(&temp).await);

    for i in 0..3 {
        let snap = store.record("k", 1_000 + i, 60_000, 3).await.unwrap();
        assert!(snap.admitted);
        assert_eq!(snap.count, (i + 1) as u32);
        assert_eq!(snap.oldest_ms, Some(1_000));
    }

    let denied = store.record("k", 2_000, 60_000, 3).await.unwrap();
    assert!(!denied.admitted);
    assert_eq!(denied.count, 3);

    // Other keys are independent
    assert!(store.record("other", 2_000, 60_000, 3).await.unwrap().admitted);
}

#[tokio::test]
async fn test_window_prunes_expired_hits() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let store = DurableWindowStore::new(db.clone());

    store.record("k", 1_000, 60_000, 1).await.unwrap();
    assert!(!store.record("k", 30_000, 60_000, 1).await.unwrap().admitted);

    let snap = store.record("k", 61_001, 60_000, 1).await.unwrap();
    assert!(snap.admitted);
    assert_eq!(snap.oldest_ms, Some(61_001));
    assert_eq!(db.hit_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_limiters_sharing_a_database_share_the_window() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let clock = ManualClock::new(10_000);

    let a = RateLimiter::new(2, MINUTE, Arc::new(clock.clone()))
        .with_store(Arc::new(DurableWindowStore::new(db.clone())));
    let b = RateLimiter::new(2, MINUTE, Arc::new(clock.clone()))
        .with_store(Arc::new(DurableWindowStore::new(db.clone())));

    assert!(a.admit("client").await.allowed);
    assert!(b.admit("client").await.allowed);

    let denied = a.admit("client").await;
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.retry_after, Some(denied.reset_seconds));
    assert!(denied.reset_seconds > 0);

    clock.advance(MINUTE + Duration::from_millis(1));
    assert!(b.admit("client").await.allowed);
}

#[tokio::test]
async fn test_lease_excludes_second_holder() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let clock = ManualClock::new(1_000);

    let a = DurableDirLock::new(db.clone(), "/tmp/glyph", MINUTE, Arc::new(clock.clone()));
    let b = DurableDirLock::new(db.clone(), "/tmp/glyph", MINUTE, Arc::new(clock.clone()));

    let token = a.try_acquire().await.unwrap().expect("first lease");
    assert!(b.try_acquire().await.unwrap().is_none());

    a.release(token).await.unwrap();
    assert!(b.try_acquire().await.unwrap().is_some());
}

#[tokio::test]
async fn test_expired_lease_is_reclaimed() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let clock = ManualClock::new(1_000);

    let crashed = DurableDirLock::new(db.clone(), "/tmp/glyph", MINUTE, Arc::new(clock.clone()));
    let _abandoned = crashed.try_acquire().await.unwrap().unwrap();

    let next = DurableDirLock::new(db.clone(), "/tmp/glyph", MINUTE, Arc::new(clock.clone()));
    assert!(next.try_acquire().await.unwrap().is_none());

    clock.advance(MINUTE + Duration::from_millis(1));
    assert!(next.try_acquire().await.unwrap().is_some());
}

#[tokio::test]
async fn test_refreshed_lease_outlives_its_first_expiry() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let clock = ManualClock::new(1_000);

    let holder = DurableDirLock::new(db.clone(), "/tmp/glyph", MINUTE, Arc::new(clock.clone()));
    let rival = DurableDirLock::new(db.clone(), "/tmp/glyph", MINUTE, Arc::new(clock.clone()));
    let token = holder.try_acquire().await.unwrap().unwrap();
    assert_eq!(holder.refresh_interval(), Some(Duration::from_secs(20)));

    clock.advance(Duration::from_secs(50));
    holder.refresh(&token).await.unwrap();
    clock.advance(Duration::from_secs(50));
    assert!(rival.try_acquire().await.unwrap().is_none());

    // Once lost, a lease cannot be refreshed back
    clock.advance(MINUTE);
    assert!(rival.try_acquire().await.unwrap().is_some());
    assert!(holder.refresh(&token).await.is_err());
}

#[tokio::test]
async fn test_janitor_skips_while_lease_held() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let artifacts = TempDir::new().unwrap();
    let clock = ManualClock::new(1_000);

    let holder = DurableDirLock::new(db.clone(), "artifacts", MINUTE, Arc::new(clock.clone()));
    let _held = holder.try_acquire().await.unwrap().unwrap();

    let config = JanitorConfig {
        dir: artifacts.path().to_path_buf(),
        ..Default::default()
    };
    let lock = Arc::new(DurableDirLock::new(db, "artifacts", MINUTE, Arc::new(clock)));
    let janitor = Janitor::with_lock(config, lock);

    assert!(janitor.run_once().await.unwrap().skipped_locked);
}
