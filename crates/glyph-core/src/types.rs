//! Core type definitions for the generation flow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of artifact a provider produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Raster,
    Vector,
    Placeholder,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raster => write!(f, "raster"),
            Self::Vector => write!(f, "vector"),
            Self::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// A generated artifact reference
///
/// Inline `bytes` are never serialized; consumers get the URL, path or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub mime_type: String,
    /// Provider that produced it ("local" for in-process output)
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Textual payload, e.g. SVG markup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
}

impl Artifact {
    pub fn raster_url(provider: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Raster,
            mime_type: "image/png".to_string(),
            provider: provider.into(),
            url: Some(url.into()),
            path: None,
            text: None,
            bytes: None,
        }
    }

    pub fn svg(provider: impl Into<String>, markup: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Vector,
            mime_type: "image/svg+xml".to_string(),
            provider: provider.into(),
            url: None,
            path: None,
            text: Some(markup.into()),
            bytes: None,
        }
    }

    pub fn with_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Size of the inline payload, 0 if none
    pub fn inline_len(&self) -> usize {
        self.bytes.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Copy suitable for a long-lived cache slot
    ///
    /// Inline bytes above `max_inline_bytes` are dropped; metadata is kept.
    pub fn for_cache(&self, max_inline_bytes: usize) -> Self {
        let mut copy = self.clone();
        if copy.inline_len() > max_inline_bytes {
            copy.bytes = None;
        }
        copy
    }
}

/// Image request parameters that feed the artifact cache key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl Default for ImageRequest {
    fn default() -> Self {
        Self {
            size: "1024x1024".to_string(),
            style: None,
        }
    }
}

/// Wall time spent in one strategy step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: String,
    pub duration_ms: u64,
    pub ok: bool,
}

/// Request-scoped state shared by the strategies of one chain run
///
/// Never shared across requests. A raster left here by one strategy is
/// available to the strategies after it.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub prompt: String,
    pub request: ImageRequest,
    pub enhanced_prompt: Option<String>,
    raster: Option<Artifact>,
    pub timings: Vec<StepTiming>,
    pub started_at: DateTime<Utc>,
}

impl GenerationContext {
    pub fn new(prompt: impl Into<String>, request: ImageRequest) -> Self {
        Self {
            prompt: prompt.into(),
            request,
            enhanced_prompt: None,
            raster: None,
            timings: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Prompt to send downstream: the enhanced one when available
    pub fn effective_prompt(&self) -> &str {
        self.enhanced_prompt.as_deref().unwrap_or(&self.prompt)
    }

    pub fn raster(&self) -> Option<&Artifact> {
        self.raster.as_ref()
    }

    pub fn set_raster(&mut self, raster: Artifact) {
        self.raster = Some(raster);
    }

    /// Hand the raster to the caller, leaving none behind
    pub fn take_raster(&mut self) -> Option<Artifact> {
        self.raster.take()
    }

    pub fn record_timing(&mut self, step: impl Into<String>, duration_ms: u64, ok: bool) {
        self.timings.push(StepTiming {
            step: step.into(),
            duration_ms,
            ok,
        });
    }
}

/// Mode label of the built-in bottom-of-chain result
pub const CRITICAL_MODE: &str = "critical";

/// The single result returned for a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub success: bool,
    pub partial: bool,
    pub mode: String,
    pub artifacts: Vec<Artifact>,
    pub message: String,
    /// Name of the strategy that produced this outcome
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub correlation_id: String,
}

impl StrategyOutcome {
    /// Full-fidelity result
    pub fn success(mode: impl Into<String>, artifacts: Vec<Artifact>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            partial: false,
            mode: mode.into(),
            artifacts,
            message: message.into(),
            strategy: String::new(),
            correlation_id: String::new(),
        }
    }

    /// Usable but degraded result
    pub fn partial(mode: impl Into<String>, artifacts: Vec<Artifact>, message: impl Into<String>) -> Self {
        Self {
            partial: true,
            ..Self::success(mode, artifacts, message)
        }
    }

    /// Returned when every strategy failed
    pub fn critical(correlation_id: impl Into<String>) -> Self {
        Self {
            success: false,
            partial: true,
            mode: CRITICAL_MODE.to_string(),
            artifacts: Vec::new(),
            message: "Generation failed; no strategy produced a result".to_string(),
            strategy: CRITICAL_MODE.to_string(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.mode == CRITICAL_MODE
    }

    /// Whether a strategy returned something the caller can use
    pub fn is_usable(&self) -> bool {
        !self.artifacts.is_empty()
    }

    pub fn primary_artifact(&self) -> Option<&Artifact> {
        self.artifacts.first()
    }
}
