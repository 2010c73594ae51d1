//! Unified error types for Glyph
//!
//! Every failure is sorted into one [`ErrorClass`] bucket. The class decides
//! what the resilience layer does with it: retry, trip the cooldown, or fall
//! through to the next strategy.

use thiserror::Error;

/// Failure taxonomy shared by every provider-calling path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Timeouts, 5xx, connection resets. Retried per policy.
    Transient,
    /// Bad request, auth failure, malformed response. Never retried.
    Terminal,
    /// Quota, credit or rate-limit depletion. Trips the cooldown.
    Exhausted,
    /// Raised by the timeout guard
    Timeout,
    /// Disk or lock contention
    Resource,
    /// Invalid configuration value
    Configuration,
}

impl ErrorClass {
    /// Classify an HTTP status code returned by a provider
    pub fn from_status(status: u16) -> Self {
        match status {
            429 | 500 | 502 | 503 | 504 => Self::Transient,
            _ => Self::Terminal,
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Terminal => write!(f, "terminal"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Timeout => write!(f, "timeout"),
            Self::Resource => write!(f, "resource"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Unified error type for all Glyph operations
#[derive(Error, Debug)]
pub enum GlyphError {
    // Provider errors
    #[error("Transient error from {provider}: {message}")]
    TransientProvider { provider: String, message: String },

    #[error("Terminal error from {provider}: {message}")]
    TerminalProvider { provider: String, message: String },

    #[error("Provider {provider} exhausted: {message}")]
    ExhaustedProvider { provider: String, message: String },

    // Guard errors
    #[error("{label} timed out after {duration_ms}ms")]
    Timeout { label: String, duration_ms: u64 },

    // Infrastructure errors
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl GlyphError {
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn terminal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TerminalProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn exhausted(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExhaustedProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a provider error from an HTTP status
    pub fn from_status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let provider = provider.into();
        let message = format!("HTTP {}: {}", status, message.into());
        match ErrorClass::from_status(status) {
            ErrorClass::Transient => Self::TransientProvider { provider, message },
            _ => Self::TerminalProvider { provider, message },
        }
    }

    /// Taxonomy bucket for this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TransientProvider { .. } => ErrorClass::Transient,
            Self::TerminalProvider { .. } => ErrorClass::Terminal,
            Self::ExhaustedProvider { .. } => ErrorClass::Exhausted,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::Resource(_) | Self::Storage(_) | Self::Io(_) => ErrorClass::Resource,
            Self::Configuration(_) => ErrorClass::Configuration,
            Self::Serialization(_) | Self::Other(_) => ErrorClass::Terminal,
        }
    }

    /// Whether the default retry predicate treats this error as transient
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::Timeout)
    }

    pub fn is_exhausted(&self) -> bool {
        self.class() == ErrorClass::Exhausted
    }
}

/// Result type alias using GlyphError
pub type Result<T> = std::result::Result<T, GlyphError>;
