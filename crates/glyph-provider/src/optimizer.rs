//! Post-processing of vector output
//!
//! The variant is chosen once from `providers.optimizer` at startup.

use glyph_core::{Artifact, ArtifactKind, GlyphError, Result};
use std::sync::Arc;

pub trait ArtifactOptimizer: Send + Sync {
    fn name(&self) -> &str;

    fn optimize(&self, artifact: Artifact) -> Artifact;
}

/// Returns artifacts unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl ArtifactOptimizer for PassThrough {
    fn name(&self) -> &str {
        "none"
    }

    fn optimize(&self, artifact: Artifact) -> Artifact {
        artifact
    }
}

/// Collapses whitespace between SVG tags
#[derive(Debug, Default, Clone, Copy)]
pub struct Minify;

impl ArtifactOptimizer for Minify {
    fn name(&self) -> &str {
        "minify"
    }

    fn optimize(&self, mut artifact: Artifact) -> Artifact {
        if artifact.kind != ArtifactKind::Vector {
            return artifact;
        }
        if let Some(text) = artifact.text.take() {
            artifact.text = Some(minify_markup(&text));
        }
        artifact
    }
}

fn minify_markup(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut pending_ws = false;
    let mut after_tag = false;

    for ch in markup.trim().chars() {
        if ch.is_whitespace() {
            pending_ws = true;
            continue;
        }
        if pending_ws {
            // Whitespace that only separates tags is dropped, text spacing is kept
            if !(after_tag && ch == '<') {
                out.push(' ');
            }
            pending_ws = false;
        }
        out.push(ch);
        after_tag = ch == '>';
    }
    out
}

/// Resolve the configured optimizer name
pub fn optimizer_from_config(name: &str) -> Result<Arc<dyn ArtifactOptimizer>> {
    match name.trim().to_lowercase().as_str() {
        "" | "none" | "passthrough" => Ok(Arc::new(PassThrough)),
        "minify" => Ok(Arc::new(Minify)),
        other => Err(GlyphError::Configuration(format!(
            "Unknown optimizer '{}'. Expected 'none' or 'minify'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_collapses_inter_tag_whitespace() {
        let svg = Artifact::svg(
            "vectorizer",
            "<svg>\n  <g>\n    <text>hello   world</text>\n  </g>\n</svg>\n",
        );
        let out = Minify.optimize(svg);
        assert_eq!(
            out.text.as_deref(),
            Some("<svg><g><text>hello world</text></g></svg>")
        );
    }

    #[test]
    fn test_minify_leaves_rasters_alone() {
        let raster = Artifact::raster_url("synthesizer", "https://img.example/a.png");
        let out = Minify.optimize(raster.clone());
        assert_eq!(out, raster);
    }

    #[test]
    fn test_optimizer_selection() {
        assert_eq!(optimizer_from_config("none").unwrap().name(), "none");
        assert_eq!(optimizer_from_config("Minify").unwrap().name(), "minify");
        assert!(optimizer_from_config("svgo").is_err());
    }
}
