//! Cooldown-guarded wrapper for the metered synthesizer

use async_trait::async_trait;
use glyph_core::{Artifact, GlyphError, ImageRequest, Result};
use glyph_resilience::CooldownManager;
use std::sync::Arc;

use crate::capability::ImageSynthesizer;

/// Short-circuits the inner synthesizer while its cooldown is active and
/// trips the cooldown whenever the provider reports exhaustion.
pub struct MeteredSynthesizer {
    inner: Arc<dyn ImageSynthesizer>,
    cooldown: Arc<CooldownManager>,
}

impl MeteredSynthesizer {
    pub fn new(inner: Arc<dyn ImageSynthesizer>, cooldown: Arc<CooldownManager>) -> Self {
        Self { inner, cooldown }
    }

    /// Cheap pre-check for strategies that should skip rather than fail
    pub fn is_available(&self) -> bool {
        !self.cooldown.is_in_cooldown()
    }

    pub fn cooldown(&self) -> &Arc<CooldownManager> {
        &self.cooldown
    }
}

#[async_trait]
impl ImageSynthesizer for MeteredSynthesizer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn synthesize(&self, prompt: &str, request: &ImageRequest) -> Result<Artifact> {
        if !self.cooldown.allow(self.inner.name()) {
            return Err(GlyphError::exhausted(
                self.inner.name(),
                format!(
                    "cooling down for another {}s",
                    self.cooldown.remaining_ms().div_ceil(1000)
                ),
            ));
        }

        match self.inner.synthesize(prompt, request).await {
            Err(err) if err.is_exhausted() => {
                self.cooldown.trip_default();
                Err(err)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_core::{ManualClock, Result};
    use glyph_resilience::CooldownPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct QuotaGone {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ImageSynthesizer for QuotaGone {
        fn name(&self) -> &str {
            "synthesizer"
        }

        async fn synthesize(&self, _prompt: &str, _request: &ImageRequest) -> Result<Artifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GlyphError::exhausted("synthesizer", "credits depleted"))
        }
    }

    #[tokio::test]
    async fn test_exhaustion_trips_and_short_circuits() {
        let clock = ManualClock::new(1_000);
        let cooldown = Arc::new(CooldownManager::new(
            CooldownPolicy::default(),
            Arc::new(clock.clone()),
        ));
        let inner = Arc::new(QuotaGone {
            calls: AtomicU32::new(0),
        });
        let metered = MeteredSynthesizer::new(inner.clone(), cooldown.clone());
        let request = ImageRequest::default();

        assert!(metered.is_available());
        assert!(metered.synthesize("a", &request).await.unwrap_err().is_exhausted());
        assert!(!metered.is_available());

        // Cooling: inner provider is not called again
        assert!(metered.synthesize("a", &request).await.unwrap_err().is_exhausted());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(31 * 60));
        assert!(metered.is_available());
    }
}
