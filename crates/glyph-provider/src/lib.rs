//! # glyph-provider
//!
//! Upstream AI providers as capabilities the orchestrator can call without
//! knowing their wire formats.
//!
//! - [`PromptEnhancer`], [`ImageSynthesizer`], [`Vectorizer`] capability traits
//! - [`HttpProviderClient`] classifies every failure into the error taxonomy
//! - [`MeteredSynthesizer`] puts the paid synthesizer behind its cooldown
//! - [`ArtifactOptimizer`] post-processes vector output
//! - [`ArtifactStore`] writes results where the janitor can reclaim them

pub mod artifact_store;
pub mod auth;
pub mod capability;
pub mod client;
pub mod http;
pub mod metered;
pub mod optimizer;
pub mod types;

pub use artifact_store::{ArtifactStore, STAGING_SUFFIX};
pub use auth::resolve_api_key;
pub use capability::{ImageSynthesizer, PromptEnhancer, Vectorizer};
pub use client::{classify_failure, HttpProviderClient};
pub use http::{HttpImageSynthesizer, HttpPromptEnhancer, HttpVectorizer};
pub use metered::MeteredSynthesizer;
pub use optimizer::{optimizer_from_config, ArtifactOptimizer, Minify, PassThrough};
