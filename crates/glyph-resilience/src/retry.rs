//! Retry executor with jittered exponential backoff
//!
//! Delay before retry `n` (0-based) is
//! `min(max_delay, base_delay * uniform(1 - jitter, 1 + jitter) * 2^n)`.
//! Jitter keeps concurrent requests that hit the same outage from retrying
//! in lockstep.

use glyph_core::{GlyphError, Result, RetryConfig};
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Decides whether an error is worth another attempt
pub type RetryPredicate = Arc<dyn Fn(&GlyphError) -> bool + Send + Sync>;

/// Immutable retry settings
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
    retryable: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter_ratio", &self.jitter_ratio)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Policy using the default transient-error predicate
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: base_delay.saturating_mul(16),
            jitter_ratio: 0.2,
            retryable: Arc::new(GlyphError::is_retryable),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
            .with_jitter(config.jitter_ratio)
    }

    /// A single attempt, never retried
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Cap for a single delay; never below `base_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.base_delay);
        self
    }

    pub fn with_jitter(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 0.99);
        self
    }

    /// Replace the retryable predicate
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&GlyphError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn is_retryable(&self, error: &GlyphError) -> bool {
        (self.retryable)(error)
    }

    /// Delay before retry `attempt` for a given jitter factor
    pub fn delay_for_attempt(&self, attempt: u32, jitter_factor: f64) -> Duration {
        let exponent = 2f64.powi(attempt.min(30) as i32);
        let millis = self.base_delay.as_millis() as f64 * jitter_factor * exponent;
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry `attempt` with a fresh random jitter factor
    pub fn sample_delay(&self, attempt: u32) -> Duration {
        let factor = if self.jitter_ratio > 0.0 {
            rand::thread_rng().gen_range((1.0 - self.jitter_ratio)..(1.0 + self.jitter_ratio))
        } else {
            1.0
        };
        self.delay_for_attempt(attempt, factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `operation` until it succeeds, fails terminally, or the budget is spent
///
/// `operation` receives the 0-based attempt index. The last error is returned
/// unchanged.
pub async fn with_retries<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} attempts", attempt + 1);
                }
                return Ok(value);
            }
            Err(error) => {
                if !policy.is_retryable(&error) {
                    debug!("Non-retryable error: {}", error);
                    return Err(error);
                }
                if attempt + 1 >= policy.max_attempts {
                    warn!(
                        "Retry budget ({}) exhausted. Last error: {}",
                        policy.max_attempts, error
                    );
                    return Err(error);
                }

                let delay = policy.sample_delay(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {}ms",
                    attempt + 1,
                    policy.max_attempts,
                    error,
                    delay.as_millis()
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
