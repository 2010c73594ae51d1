//! Degrading strategy chain
//!
//! Strategies run strictly in order. The first usable outcome wins and no
//! later strategy runs. A strategy that panics counts as a failed one.
//! When nothing produces a result, or the chain deadline passes, the caller
//! still gets the built-in critical outcome.

use futures::FutureExt;
use glyph_core::{GenerationContext, GlyphError, StrategyOutcome};
use glyph_resilience::with_timeout;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::strategy::Strategy;

/// Run `strategies` in order and return exactly one outcome
#[instrument(skip_all, fields(prompt_len = ctx.prompt.len()))]
pub async fn run_strategy_chain(
    ctx: &mut GenerationContext,
    strategies: &[Arc<dyn Strategy>],
    chain_timeout: Duration,
) -> StrategyOutcome {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    debug!("Starting chain {} with {} strategies", correlation_id, strategies.len());

    let run = async {
        let mut winner = None;
        for strategy in strategies {
            if let Some(outcome) = attempt_one(ctx, strategy.as_ref()).await {
                winner = Some(outcome);
                break;
            }
        }
        Ok::<_, GlyphError>(winner)
    };

    let result = with_timeout(run, chain_timeout, "strategy chain").await;

    match result {
        Ok(Some(mut outcome)) => {
            outcome.correlation_id = correlation_id;
            info!(
                "Chain {} served by '{}' (mode {})",
                outcome.correlation_id, outcome.strategy, outcome.mode
            );
            outcome
        }
        Ok(None) => {
            error!("Chain {}: every strategy failed", correlation_id);
            StrategyOutcome::critical(correlation_id)
        }
        Err(e) => {
            error!("Chain {} aborted: {}", correlation_id, e);
            StrategyOutcome::critical(correlation_id)
        }
    }
}

async fn attempt_one(ctx: &mut GenerationContext, strategy: &dyn Strategy) -> Option<StrategyOutcome> {
    let name = strategy.name().to_string();
    let started = Instant::now();
    let result = AssertUnwindSafe(strategy.attempt(ctx)).catch_unwind().await;
    let elapsed = started.elapsed().as_millis() as u64;

    let result = match result {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Strategy '{}' panicked: {}", name, reason);
            ctx.record_timing(&name, elapsed, false);
            return None;
        }
    };

    match result {
        Ok(Some(mut outcome)) if outcome.is_usable() => {
            ctx.record_timing(&name, elapsed, true);
            outcome.strategy = name;
            Some(outcome)
        }
        Ok(_) => {
            debug!("Strategy '{}' produced nothing", name);
            ctx.record_timing(&name, elapsed, false);
            None
        }
        Err(e) => {
            warn!("Strategy '{}' failed ({}): {}", name, e.class(), e);
            ctx.record_timing(&name, elapsed, false);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use glyph_core::{Artifact, ImageRequest, Result};

    struct Slow;

    #[async_trait]
    impl Strategy for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn attempt(&self, _ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(StrategyOutcome::success(
                "vector",
                vec![Artifact::svg("slow", "<svg/>")],
                "late",
            )))
        }
    }

    struct Failing;

    #[async_trait]
    impl Strategy for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn attempt(&self, _ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>> {
            Err(GlyphError::transient("synthesizer", "HTTP 503"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Strategy for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn attempt(&self, _ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>> {
            panic!("index out of bounds");
        }
    }

    struct Steady;

    #[async_trait]
    impl Strategy for Steady {
        fn name(&self) -> &str {
            "steady"
        }

        async fn attempt(&self, _ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>> {
            Ok(Some(StrategyOutcome::success(
                "vector",
                vec![Artifact::svg("steady", "<svg/>")],
                "ok",
            )))
        }
    }

    #[tokio::test]
    async fn test_panicking_strategy_falls_through() {
        let mut ctx = GenerationContext::new("x", ImageRequest::default());
        let strategies: Vec<Arc<dyn Strategy>> = vec![Arc::new(Panicking), Arc::new(Steady)];

        let outcome = run_strategy_chain(&mut ctx, &strategies, Duration::from_secs(1)).await;
        assert_eq!(outcome.strategy, "steady");
        assert!(outcome.success);
        assert_eq!(ctx.timings.len(), 2);
        assert_eq!(ctx.timings[0].step, "panicking");
        assert!(!ctx.timings[0].ok);
    }

    #[tokio::test]
    async fn test_panic_in_last_strategy_is_critical() {
        let mut ctx = GenerationContext::new("x", ImageRequest::default());
        let strategies: Vec<Arc<dyn Strategy>> = vec![Arc::new(Panicking)];

        let outcome = run_strategy_chain(&mut ctx, &strategies, Duration::from_secs(1)).await;
        assert!(outcome.is_critical());
    }

    #[tokio::test]
    async fn test_chain_deadline_yields_critical() {
        let mut ctx = GenerationContext::new("x", ImageRequest::default());
        let strategies: Vec<Arc<dyn Strategy>> = vec![Arc::new(Slow)];

        let outcome = run_strategy_chain(&mut ctx, &strategies, Duration::from_millis(20)).await;
        assert!(outcome.is_critical());
        assert!(!outcome.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn test_failed_steps_are_timed() {
        let mut ctx = GenerationContext::new("x", ImageRequest::default());
        let strategies: Vec<Arc<dyn Strategy>> = vec![Arc::new(Failing), Arc::new(Failing)];

        let outcome = run_strategy_chain(&mut ctx, &strategies, Duration::from_secs(1)).await;
        assert!(outcome.is_critical());
        assert_eq!(ctx.timings.len(), 2);
        assert!(ctx.timings.iter().all(|t| !t.ok && t.step == "failing"));
    }

    #[tokio::test]
    async fn test_empty_chain_is_critical() {
        let mut ctx = GenerationContext::new("x", ImageRequest::default());
        let outcome = run_strategy_chain(&mut ctx, &[], Duration::from_secs(1)).await;
        assert!(outcome.is_critical());
        assert!(!outcome.success);
    }
}
