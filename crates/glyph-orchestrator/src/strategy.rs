use async_trait::async_trait;
use glyph_core::{GenerationContext, Result, StrategyOutcome};

/// One self-contained attempt at producing a usable result
///
/// `Ok(None)` means "does not apply, try the next strategy". An `Err` is
/// logged by the chain and treated the same way.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(&self, ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>>;
}
