//! Configuration management for Glyph
//!
//! Defaults, then `.glyph/config.toml`, then `GLYPH_*` environment
//! variables. Validation runs last so a bad knob stops startup instead of
//! failing some later request.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::{GlyphError, Result};

/// Top-level Glyph configuration
///
/// Loaded from `.glyph/config.toml` in the service root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlyphConfig {
    #[serde(default)]
    pub janitor: JanitorConfig,

    #[serde(default)]
    pub cooldown: CooldownConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Temp-artifact directory cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Shared artifact directory
    #[serde(default = "default_temp_dir")]
    pub dir: PathBuf,

    /// Files older than this are deleted
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,

    /// Base interval between scheduled passes
    #[serde(default = "default_cleanup_interval_ms")]
    pub interval_ms: u64,

    /// Interval jitter as a fraction of `interval_ms`
    #[serde(default = "default_schedule_jitter")]
    pub jitter_ratio: f64,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Only files whose name starts with one of these are ever touched
    #[serde(default = "default_allowed_prefixes")]
    pub allowed_prefixes: Vec<String>,

    #[serde(default = "default_delete_attempts")]
    pub delete_attempts: usize,

    #[serde(default = "default_delete_backoff_ms")]
    pub delete_backoff_ms: u64,

    /// A lock file older than this is considered abandoned
    #[serde(default = "default_stale_lock_ms")]
    pub stale_lock_ms: u64,
}

/// Metered-provider cooldown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    #[serde(default = "default_cooldown_minutes")]
    pub base_minutes: u64,

    /// Trips beyond this count get the extra penalty
    #[serde(default = "default_escalate_after_trips")]
    pub escalate_after_trips: u32,

    #[serde(default = "default_penalty_minutes")]
    pub penalty_minutes: u64,

    /// A trip this soon after the window ends still counts as repeated
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: u64,
}

/// Sliding-window request limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_rate_max")]
    pub max_requests: u32,

    /// Durable window store; in-memory only when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

/// Result cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_items")]
    pub max_items: usize,

    #[serde(default = "default_cache_max_age_ms")]
    pub max_age_ms: u64,

    #[serde(default = "default_cache_prune_interval_ms")]
    pub prune_interval_ms: u64,

    /// Inline payloads larger than this are not retained
    #[serde(default = "default_cache_max_inline_bytes")]
    pub max_inline_bytes: usize,
}

/// Deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per provider call
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,

    /// Whole strategy chain
    #[serde(default = "default_chain_timeout_ms")]
    pub chain_timeout_ms: u64,
}

/// Retry-backoff executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_retry_cap_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_retry_jitter")]
    pub jitter_ratio: f64,
}

/// One upstream provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub name: String,

    #[serde(default)]
    pub url: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Metered providers sit behind the cooldown breaker
    #[serde(default)]
    pub metered: bool,
}

/// Upstream providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_enhancer")]
    pub enhancer: ProviderEndpoint,

    #[serde(default = "default_synthesizer")]
    pub synthesizer: ProviderEndpoint,

    #[serde(default = "default_vectorizer")]
    pub vectorizer: ProviderEndpoint,

    /// "none" or "minify"
    #[serde(default = "default_optimizer")]
    pub optimizer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

/// Upper bound for every cooldown length knob (one week)
pub const MAX_COOLDOWN_MINUTES: u64 = 7 * 24 * 60;

// Default value providers
fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("glyph-artifacts")
}

fn default_retention_ms() -> u64 {
    60 * 60 * 1000
}

fn default_cleanup_interval_ms() -> u64 {
    15 * 60 * 1000
}

fn default_schedule_jitter() -> f64 {
    0.2
}

fn default_max_bytes() -> u64 {
    500 * 1024 * 1024
}

fn default_max_files() -> usize {
    1000
}

fn default_allowed_prefixes() -> Vec<String> {
    vec![
        "raster-".to_string(),
        "vector-".to_string(),
        "upload-".to_string(),
    ]
}

fn default_delete_attempts() -> usize {
    3
}

fn default_delete_backoff_ms() -> u64 {
    50
}

fn default_stale_lock_ms() -> u64 {
    10 * 60 * 1000
}

fn default_cooldown_minutes() -> u64 {
    30
}

fn default_escalate_after_trips() -> u32 {
    3
}

fn default_penalty_minutes() -> u64 {
    15
}

fn default_grace_minutes() -> u64 {
    5
}

fn default_rate_window_ms() -> u64 {
    60 * 1000
}

fn default_rate_max() -> u32 {
    10
}

fn default_cache_max_items() -> usize {
    100
}

fn default_cache_max_age_ms() -> u64 {
    60 * 60 * 1000
}

fn default_cache_prune_interval_ms() -> u64 {
    5 * 60 * 1000
}

fn default_cache_max_inline_bytes() -> usize {
    256 * 1024
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

fn default_chain_timeout_ms() -> u64 {
    120_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_cap_ms() -> u64 {
    8_000
}

fn default_retry_jitter() -> f64 {
    0.2
}

fn default_enhancer() -> ProviderEndpoint {
    ProviderEndpoint {
        name: "enhancer".to_string(),
        url: None,
        api_key_env: "GLYPH_ENHANCER_API_KEY".to_string(),
        metered: false,
    }
}

fn default_synthesizer() -> ProviderEndpoint {
    ProviderEndpoint {
        name: "synthesizer".to_string(),
        url: None,
        api_key_env: "GLYPH_SYNTHESIZER_API_KEY".to_string(),
        metered: true,
    }
}

fn default_vectorizer() -> ProviderEndpoint {
    ProviderEndpoint {
        name: "vectorizer".to_string(),
        url: None,
        api_key_env: "GLYPH_VECTORIZER_API_KEY".to_string(),
        metered: false,
    }
}

fn default_optimizer() -> String {
    "none".to_string()
}

fn default_server_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn parse_knob<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        GlyphError::Configuration(format!("{} has invalid value '{}'", name, raw))
    })
}

fn parse_prefix_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl GlyphConfig {
    /// Defaults + file + process environment, validated
    pub fn load(root: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(root)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `.glyph/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".glyph/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&content).map_err(|e| {
                GlyphError::Configuration(format!("Failed to parse config file: {}", e))
            })?)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.glyph/config.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        let config_dir = root.join(".glyph");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = Self::default().to_toml()?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GlyphError::Other(format!("Failed to serialize config: {}", e)))
    }

    /// Apply `GLYPH_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GLYPH_TEMP_DIR") {
            self.janitor.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("GLYPH_TEMP_RETENTION_MS") {
            self.janitor.retention_ms = parse_knob("GLYPH_TEMP_RETENTION_MS", &v)?;
        }
        if let Some(v) = lookup("GLYPH_CLEANUP_INTERVAL_MS") {
            self.janitor.interval_ms = parse_knob("GLYPH_CLEANUP_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("GLYPH_MAX_TEMP_BYTES") {
            self.janitor.max_bytes = parse_knob("GLYPH_MAX_TEMP_BYTES", &v)?;
        }
        if let Some(v) = lookup("GLYPH_MAX_TEMP_FILES") {
            self.janitor.max_files = parse_knob("GLYPH_MAX_TEMP_FILES", &v)?;
        }
        if let Some(v) = lookup("GLYPH_TEMP_ALLOWED_PREFIXES") {
            self.janitor.allowed_prefixes = parse_prefix_list(&v);
        }
        if let Some(v) = lookup("GLYPH_COOLDOWN_MINUTES") {
            self.cooldown.base_minutes = parse_knob("GLYPH_COOLDOWN_MINUTES", &v)?;
        }
        if let Some(v) = lookup("GLYPH_RATE_LIMIT_WINDOW_MS") {
            self.rate_limit.window_ms = parse_knob("GLYPH_RATE_LIMIT_WINDOW_MS", &v)?;
        }
        if let Some(v) = lookup("GLYPH_RATE_LIMIT_MAX") {
            self.rate_limit.max_requests = parse_knob("GLYPH_RATE_LIMIT_MAX", &v)?;
        }
        if let Some(v) = lookup("GLYPH_STORE_PATH") {
            self.rate_limit.store_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("GLYPH_CACHE_MAX_ITEMS") {
            self.cache.max_items = parse_knob("GLYPH_CACHE_MAX_ITEMS", &v)?;
        }
        if let Some(v) = lookup("GLYPH_CACHE_MAX_AGE_MS") {
            self.cache.max_age_ms = parse_knob("GLYPH_CACHE_MAX_AGE_MS", &v)?;
        }
        if let Some(v) = lookup("GLYPH_HTTP_TIMEOUT_MS") {
            self.http.timeout_ms = parse_knob("GLYPH_HTTP_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("GLYPH_MAX_RETRIES") {
            self.retry.max_attempts = parse_knob("GLYPH_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("GLYPH_RETRY_BASE_MS") {
            self.retry.base_delay_ms = parse_knob("GLYPH_RETRY_BASE_MS", &v)?;
        }
        if let Some(v) = lookup("GLYPH_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_knob("GLYPH_RETRY_MAX_DELAY_MS", &v)?;
        }
        Ok(())
    }

    /// Reject values that would make a component misbehave
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: u64) -> Result<()> {
            if value == 0 {
                return Err(GlyphError::Configuration(format!("{} must be greater than 0", name)));
            }
            Ok(())
        }

        fn at_most_a_week(name: &str, minutes: u64) -> Result<()> {
            if minutes > MAX_COOLDOWN_MINUTES {
                return Err(GlyphError::Configuration(format!(
                    "{} must be at most {} minutes, got {}",
                    name, MAX_COOLDOWN_MINUTES, minutes
                )));
            }
            Ok(())
        }

        fn ratio(name: &str, value: f64) -> Result<()> {
            if !(0.0..1.0).contains(&value) {
                return Err(GlyphError::Configuration(format!(
                    "{} must be in [0, 1), got {}",
                    name, value
                )));
            }
            Ok(())
        }

        positive("janitor.retention_ms", self.janitor.retention_ms)?;
        positive("janitor.interval_ms", self.janitor.interval_ms)?;
        positive("janitor.max_bytes", self.janitor.max_bytes)?;
        positive("janitor.max_files", self.janitor.max_files as u64)?;
        positive("janitor.delete_attempts", self.janitor.delete_attempts as u64)?;
        ratio("janitor.jitter_ratio", self.janitor.jitter_ratio)?;
        if self.janitor.allowed_prefixes.is_empty() {
            return Err(GlyphError::Configuration(
                "janitor.allowed_prefixes must not be empty".to_string(),
            ));
        }

        positive("cooldown.base_minutes", self.cooldown.base_minutes)?;
        at_most_a_week("cooldown.base_minutes", self.cooldown.base_minutes)?;
        at_most_a_week("cooldown.penalty_minutes", self.cooldown.penalty_minutes)?;
        at_most_a_week("cooldown.grace_minutes", self.cooldown.grace_minutes)?;
        positive("rate_limit.window_ms", self.rate_limit.window_ms)?;
        positive("rate_limit.max_requests", self.rate_limit.max_requests as u64)?;
        positive("cache.max_items", self.cache.max_items as u64)?;
        positive("cache.max_age_ms", self.cache.max_age_ms)?;
        positive("cache.prune_interval_ms", self.cache.prune_interval_ms)?;
        positive("http.timeout_ms", self.http.timeout_ms)?;
        positive("http.chain_timeout_ms", self.http.chain_timeout_ms)?;
        positive("retry.max_attempts", self.retry.max_attempts as u64)?;
        ratio("retry.jitter_ratio", self.retry.jitter_ratio)?;

        match self.providers.optimizer.as_str() {
            "none" | "minify" => Ok(()),
            other => Err(GlyphError::Configuration(format!(
                "providers.optimizer must be 'none' or 'minify', got '{}'",
                other
            ))),
        }
    }
}

impl JanitorConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl CooldownConfig {
    pub fn base(&self) -> Duration {
        Duration::from_secs(self.base_minutes.saturating_mul(60))
    }

    pub fn penalty(&self) -> Duration {
        Duration::from_secs(self.penalty_minutes.saturating_mul(60))
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_minutes.saturating_mul(60))
    }
}

impl Default for GlyphConfig {
    fn default() -> Self {
        Self {
            janitor: JanitorConfig::default(),
            cooldown: CooldownConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            providers: ProvidersConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            dir: default_temp_dir(),
            retention_ms: default_retention_ms(),
            interval_ms: default_cleanup_interval_ms(),
            jitter_ratio: default_schedule_jitter(),
            max_bytes: default_max_bytes(),
            max_files: default_max_files(),
            allowed_prefixes: default_allowed_prefixes(),
            delete_attempts: default_delete_attempts(),
            delete_backoff_ms: default_delete_backoff_ms(),
            stale_lock_ms: default_stale_lock_ms(),
        }
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            base_minutes: default_cooldown_minutes(),
            escalate_after_trips: default_escalate_after_trips(),
            penalty_minutes: default_penalty_minutes(),
            grace_minutes: default_grace_minutes(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_rate_window_ms(),
            max_requests: default_rate_max(),
            store_path: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: default_cache_max_items(),
            max_age_ms: default_cache_max_age_ms(),
            prune_interval_ms: default_cache_prune_interval_ms(),
            max_inline_bytes: default_cache_max_inline_bytes(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
            chain_timeout_ms: default_chain_timeout_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_retry_base_ms(),
            max_delay_ms: default_retry_cap_ms(),
            jitter_ratio: default_retry_jitter(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enhancer: default_enhancer(),
            synthesizer: default_synthesizer(),
            vectorizer: default_vectorizer(),
            optimizer: default_optimizer(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}
