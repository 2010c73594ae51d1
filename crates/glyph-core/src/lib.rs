//! # glyph-core
//!
//! Core types for the Glyph generation pipeline.
//!
//! Glyph chains an AI prompt enhancer, a raster image synthesizer and a
//! vectorizer into one request. This crate holds what every other crate
//! shares:
//!
//! - [`GlyphError`] and the [`ErrorClass`] failure taxonomy
//! - [`GlyphConfig`], loaded from defaults, TOML and `GLYPH_*` variables
//! - The request-scoped [`GenerationContext`] and its [`StrategyOutcome`]
//! - A [`Clock`] seam so time-based components can be driven by tests
//! - Fail-open helpers for infrastructure work

pub mod clock;
pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, CooldownConfig, GlyphConfig, HttpConfig, JanitorConfig, ProviderEndpoint,
    ProvidersConfig, RateLimitConfig, RetryConfig, ServerConfig,
};
pub use error::{ErrorClass, GlyphError, Result};
pub use types::*;
