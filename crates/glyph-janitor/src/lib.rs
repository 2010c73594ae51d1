//! Temp-artifact janitor for Glyph.
//!
//! Generated artifacts land in one shared directory. The janitor reclaims
//! that space without racing other processes that share it.
//!
//! # Pass
//!
//! - **Lock**: take the directory's advisory lock, or skip the pass
//! - **Scan**: keep only plain files with an allowed name prefix that
//!   resolve strictly inside the directory
//! - **Retention**: delete candidates older than the retention window
//! - **Quota**: delete oldest-first until under the byte and file caps
//!
//! Passes run on a jittered schedule so replicas do not clean in lockstep.
//!
//! # Example
//!
//! ```no_run
//! use glyph_core::JanitorConfig;
//! use glyph_janitor::Janitor;
//! use std::sync::Arc;
//!
//! # async fn example() -> glyph_core::Result<()> {
//! let config = JanitorConfig::default();
//! let interval = config.interval();
//! let janitor = Arc::new(Janitor::new(config));
//!
//! let report = janitor.run_once().await?;
//! println!("deleted {}", report.deleted());
//!
//! janitor.start_scheduled(interval);
//! // ...
//! janitor.stop().await;
//! # Ok(())
//! # }
//! ```

mod janitor;
pub mod lock;

pub use janitor::{jittered, CleanupReport, Janitor, TempFileRecord};
pub use lock::{with_dir_lock, DirLock, FileDirLock, LockToken, LOCK_FILE_NAME};
