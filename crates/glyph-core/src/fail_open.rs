//! Fail-open utilities for graceful degradation
//!
//! Infrastructure work (artifact cleanup, limiter bookkeeping, cache pruning)
//! must never take a request down with it. These helpers log and swallow.
//!
//! DO NOT use fail-open for provider calls: those go through the retry
//! executor and the strategy chain so the failure is classified.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// ```no_run
/// use glyph_core::fail_open::fail_open;
/// use glyph_core::Result;
///
/// async fn sweep() -> Result<usize> {
///     Ok(3)
/// }
///
/// async fn example() {
///     let swept = fail_open("window_sweep", || sweep()).await;
///     // swept is None if sweep() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like fail_open but with linear backoff retries
///
/// Makes up to `max_attempts` calls, sleeping `base_delay * attempt` between
/// them.
///
/// ```no_run
/// use glyph_core::fail_open::fail_open_with_retries;
/// use glyph_core::Result;
/// use std::time::Duration;
///
/// async fn remove() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let removed = fail_open_with_retries(
///         "remove raster-1.png",
///         || remove(),
///         3,
///         Duration::from_millis(50),
///     )
///     .await;
///     // waits 50ms, then 100ms between attempts
/// }
/// ```
pub async fn fail_open_with_retries<F, Fut, T>(
    operation_name: &str,
    mut f: F,
    max_attempts: usize,
    base_delay: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=max_attempts {
        match f().await {
            Ok(val) => return Some(val),
            Err(e) => {
                if attempt == max_attempts {
                    warn!(
                        "{} failed after {} attempts (fail-open): {}",
                        operation_name, max_attempts, e
                    );
                    return None;
                }
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_attempts, e
                );
                tokio::time::sleep(base_delay * attempt as u32).await;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GlyphError;

    const TICK: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, GlyphError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(GlyphError::Resource("disk busy".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fail_open_with_retries_success_after_retry() {
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "test_op",
            || {
                attempts += 1;
                let current = attempts;
                async move {
                    if current < 2 {
                        Err(GlyphError::Resource("busy".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            },
            3,
            TICK,
        )
        .await;
        assert_eq!(result, Some(42));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_fail_open_with_retries_all_failures() {
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "test_op",
            || {
                attempts += 1;
                async move { Err::<i32, _>(GlyphError::Resource("persistent".to_string())) }
            },
            3,
            TICK,
        )
        .await;
        assert_eq!(result, None);
        assert_eq!(attempts, 3);
    }
}
