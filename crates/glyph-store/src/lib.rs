//! Glyph Store - durable state shared by cooperating processes
//!
//! Backs the two pieces of state that must agree across processes:
//!
//! - [`DurableWindowStore`]: sliding-window rate-limit hits
//! - [`DurableDirLock`]: lease-based janitor directory lock
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │   RateLimiter            Janitor            │
//! │   (glyph-resilience)     (glyph-janitor)    │
//! └────────┬──────────────────────┬─────────────┘
//!          │ WindowStore          │ DirLock
//! ┌────────▼──────────────────────▼─────────────┐
//! │         Glyph Store (this crate)            │
//! └─────────────────┬───────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────┐
//! │         Turso Database (WAL mode)           │
//! │  • Tables: rate_hits, dir_locks             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use glyph_core::{system_clock, RateLimitConfig};
//! use glyph_resilience::RateLimiter;
//! use glyph_store::{Database, DurableWindowStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Arc::new(Database::open(".glyph/state.db").await?);
//! let limiter = RateLimiter::from_config(&RateLimitConfig::default(), system_clock())
//!     .with_store(Arc::new(DurableWindowStore::new(db)));
//!
//! let admission = limiter.admit("203.0.113.7").await;
//! println!("remaining: {}", admission.remaining);
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod lease;
pub mod window;

pub use db::{Database, Result, StoreError};
pub use lease::DurableDirLock;
pub use window::DurableWindowStore;
