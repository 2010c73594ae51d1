//! Deadline guard for provider calls and chain runs

use glyph_core::{GlyphError, Result};
use std::future::Future;
use std::time::Duration;

/// Race `operation` against a `duration` deadline
///
/// On expiry the operation future is dropped, which cancels it at its next
/// await point, and a [`GlyphError::Timeout`] carrying `label` is returned.
/// Work the operation already committed (files written, requests sent) is
/// not rolled back.
pub async fn with_timeout<F, T>(operation: F, duration: Duration, label: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} exceeded deadline of {}ms", label, duration.as_millis());
            Err(GlyphError::Timeout {
                label: label.to_string(),
                duration_ms: duration.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fast_operation_passes_through() {
        let result = with_timeout(async { Ok(7) }, Duration::from_secs(1), "fast").await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_inner_error_is_not_masked() {
        let result: Result<()> = with_timeout(
            async { Err(GlyphError::terminal("enhancer", "bad request")) },
            Duration::from_secs(1),
            "enhance",
        )
        .await;
        assert!(matches!(result, Err(GlyphError::TerminalProvider { .. })));
    }

    #[tokio::test]
    async fn test_slow_operation_times_out_with_label() {
        let result: Result<()> = with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(20),
            "synthesize",
        )
        .await;

        match result {
            Err(GlyphError::Timeout { label, duration_ms }) => {
                assert_eq!(label, "synthesize");
                assert_eq!(duration_ms, 20);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
