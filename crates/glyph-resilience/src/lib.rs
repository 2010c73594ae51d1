//! # glyph-resilience
//!
//! The guards every provider-calling path goes through:
//!
//! - [`with_timeout`] bounds one call or a whole strategy chain
//! - [`with_retries`] re-invokes transient failures with jittered backoff
//! - [`CooldownManager`] short-circuits a metered provider after exhaustion
//! - [`RateLimiter`] shapes inbound volume per caller over a sliding window
//! - [`TtlLruCache`] memoizes idempotent results (enhanced prompts, artifacts)

mod cache;
mod cooldown;
mod rate_limit;
mod retry;
mod timeout;

pub use cache::{make_key, normalize_prompt, CacheEntry, TtlLruCache};
pub use cooldown::{CooldownManager, CooldownPolicy, CooldownState, CooldownStatus};
pub use rate_limit::{Admission, MemoryWindowStore, RateLimiter, WindowSnapshot, WindowStore};
pub use retry::{with_retries, RetryPolicy, RetryPredicate};
pub use timeout::with_timeout;
