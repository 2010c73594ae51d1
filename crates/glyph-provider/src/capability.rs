//! Provider capabilities
//!
//! The orchestrator only knows that a provider call returns a result or
//! fails with a classified [`GlyphError`](glyph_core::GlyphError).

use async_trait::async_trait;
use glyph_core::{Artifact, ImageRequest, Result};

/// Rewrites a user prompt into a richer generation prompt
#[async_trait]
pub trait PromptEnhancer: Send + Sync {
    fn name(&self) -> &str;

    async fn enhance(&self, prompt: &str) -> Result<String>;
}

/// Produces a raster image from a prompt
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, prompt: &str, request: &ImageRequest) -> Result<Artifact>;
}

/// Converts a raster artifact into a vector one
#[async_trait]
pub trait Vectorizer: Send + Sync {
    fn name(&self) -> &str;

    async fn vectorize(&self, raster: &Artifact) -> Result<Artifact>;
}
