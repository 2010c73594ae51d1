//! # glyph-orchestrator
//!
//! Turns one generation request into exactly one outcome.
//!
//! This crate provides:
//! - The [`Strategy`] trait: one attempt that may produce nothing
//! - [`run_strategy_chain`]: ordered, short-circuiting, deadline-bounded
//! - [`GenerationPipeline`]: the default five-strategy chain over the
//!   provider capabilities, with caching and the metered-provider cooldown

mod chain;
pub mod pipeline;
mod strategy;

pub use chain::run_strategy_chain;
pub use pipeline::{embed_raster_svg, GenerationPipeline, GenerationPipelineBuilder};
pub use strategy::Strategy;
