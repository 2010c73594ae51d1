//! The default generation pipeline
//!
//! Five strategies, from highest fidelity to guaranteed-available:
//!
//! 1. `primary`: enhance (cached), synthesize (metered), vectorize
//! 2. `direct-fallback`: skip enhancement, reuse any raster already produced
//! 3. `local-fallback`: wrap an existing raster in a local SVG container
//! 4. `degraded-output`: hand back the raster itself
//! 5. `emergency`: boilerplate placeholder SVG

use async_trait::async_trait;
use glyph_core::fail_open::fail_open;
use glyph_core::{
    system_clock, Artifact, ArtifactKind, Clock, GenerationContext, GlyphConfig, ImageRequest,
    Result, StrategyOutcome,
};
use glyph_provider::{
    ArtifactOptimizer, ArtifactStore, ImageSynthesizer, MeteredSynthesizer, PassThrough,
    PromptEnhancer, Vectorizer,
};
use glyph_resilience::{
    make_key, normalize_prompt, with_retries, with_timeout, CooldownManager, CooldownPolicy,
    RetryPolicy, TtlLruCache,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chain::run_strategy_chain;
use crate::strategy::Strategy;

pub const PRIMARY: &str = "primary";
pub const DIRECT_FALLBACK: &str = "direct-fallback";
pub const LOCAL_FALLBACK: &str = "local-fallback";
pub const DEGRADED_OUTPUT: &str = "degraded-output";
pub const EMERGENCY: &str = "emergency";

const PLACEHOLDER_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="512" height="512" viewBox="0 0 512 512">"##,
    r##"<rect width="512" height="512" rx="48" fill="#e5e7eb"/>"##,
    r##"<circle cx="256" cy="220" r="72" fill="#9ca3af"/>"##,
    r##"<rect x="136" y="332" width="240" height="28" rx="14" fill="#9ca3af"/>"##,
    r##"</svg>"##
);

/// Provider access shared by every strategy of the pipeline
struct Providers {
    enhancer: Arc<dyn PromptEnhancer>,
    synthesizer: MeteredSynthesizer,
    vectorizer: Arc<dyn Vectorizer>,
    optimizer: Arc<dyn ArtifactOptimizer>,
    store: Option<ArtifactStore>,
    enhancement_cache: Arc<TtlLruCache<String>>,
    artifact_cache: Arc<TtlLruCache<Artifact>>,
    retry: RetryPolicy,
    call_timeout: Duration,
    max_inline_bytes: usize,
}

impl Providers {
    /// Per-call deadline inside the retry budget
    async fn guarded<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retries(
            |_| with_timeout(call(), self.call_timeout, label),
            &self.retry,
        )
        .await
    }

    async fn enhance(&self, prompt: &str) -> Result<String> {
        let key = normalize_prompt(prompt);
        if let Some(hit) = self.enhancement_cache.get(&key) {
            debug!("Enhancement cache hit");
            return Ok(hit);
        }

        let enhanced = self
            .guarded(self.enhancer.name(), || self.enhancer.enhance(prompt))
            .await?;
        self.enhancement_cache.set(key, enhanced.clone());
        Ok(enhanced)
    }

    /// `Ok(None)` while the metered synthesizer is cooling down
    async fn synthesize(&self, prompt: &str, request: &ImageRequest) -> Result<Option<Artifact>> {
        let key = make_key(&[
            ("prompt", prompt),
            ("provider", self.synthesizer.name()),
            ("size", &request.size),
            ("style", request.style.as_deref().unwrap_or("")),
        ]);
        if let Some(hit) = self.artifact_cache.get(&key) {
            debug!("Artifact cache hit");
            return Ok(Some(hit));
        }

        if !self.synthesizer.is_available() {
            return Ok(None);
        }

        let raster = self
            .guarded(self.synthesizer.name(), || {
                self.synthesizer.synthesize(prompt, request)
            })
            .await?;
        self.artifact_cache
            .set(key, raster.for_cache(self.max_inline_bytes));
        Ok(Some(raster))
    }

    async fn vectorize(&self, raster: &Artifact) -> Result<Artifact> {
        let svg = self
            .guarded(self.vectorizer.name(), || self.vectorizer.vectorize(raster))
            .await?;
        Ok(self.finish(svg).await)
    }

    /// Optimize and, when a store is configured, persist a vector artifact
    async fn finish(&self, svg: Artifact) -> Artifact {
        let svg = self.optimizer.optimize(svg);
        match &self.store {
            Some(store) => {
                let fallback = svg.clone();
                fail_open("persist artifact", || store.persist(svg))
                    .await
                    .unwrap_or(fallback)
            }
            None => svg,
        }
    }
}

fn raster_dimensions(size: &str) -> (u32, u32) {
    size.split_once('x')
        .and_then(|(w, h)| Some((w.trim().parse().ok()?, h.trim().parse().ok()?)))
        .filter(|&(w, h)| w > 0 && h > 0)
        .unwrap_or((1024, 1024))
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// SVG container referencing a raster by URL
pub fn embed_raster_svg(url: &str, request: &ImageRequest) -> String {
    let (w, h) = raster_dimensions(&request.size);
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><image href="{url}" xlink:href="{url}" width="{w}" height="{h}"/></svg>"#,
        w = w,
        h = h,
        url = escape_attr(url)
    )
}

struct Primary(Arc<Providers>);

#[async_trait]
impl Strategy for Primary {
    fn name(&self) -> &str {
        PRIMARY
    }

    async fn attempt(&self, ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>> {
        let enhanced = self.0.enhance(&ctx.prompt).await?;
        ctx.enhanced_prompt = Some(enhanced);

        let request = ctx.request.clone();
        let raster = match self.0.synthesize(ctx.effective_prompt(), &request).await? {
            Some(raster) => raster,
            None => return Ok(None),
        };
        ctx.set_raster(raster.clone());

        let svg = self.0.vectorize(&raster).await?;
        Ok(Some(StrategyOutcome::success(
            "vector",
            vec![svg, raster],
            "Generated vector artwork",
        )))
    }
}

struct DirectFallback(Arc<Providers>);

#[async_trait]
impl Strategy for DirectFallback {
    fn name(&self) -> &str {
        DIRECT_FALLBACK
    }

    async fn attempt(&self, ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>> {
        let raster = match ctx.raster().cloned() {
            Some(raster) => raster,
            None => {
                let request = ctx.request.clone();
                match self.0.synthesize(&ctx.prompt, &request).await? {
                    Some(raster) => {
                        ctx.set_raster(raster.clone());
                        raster
                    }
                    None => return Ok(None),
                }
            }
        };

        let svg = self.0.vectorize(&raster).await?;
        Ok(Some(StrategyOutcome::success(
            "vector",
            vec![svg, raster],
            "Generated vector artwork without prompt enhancement",
        )))
    }
}

struct LocalFallback(Arc<Providers>);

#[async_trait]
impl Strategy for LocalFallback {
    fn name(&self) -> &str {
        LOCAL_FALLBACK
    }

    async fn attempt(&self, ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>> {
        let raster = match ctx.raster() {
            Some(raster) => raster.clone(),
            None => return Ok(None),
        };
        let url = match raster.url.as_deref() {
            Some(url) => url,
            None => return Ok(None),
        };

        let svg = Artifact::svg("local", embed_raster_svg(url, &ctx.request));
        let svg = self.0.finish(svg).await;
        Ok(Some(StrategyOutcome::partial(
            "embedded",
            vec![svg, raster],
            "Vectorization unavailable; raster embedded in an SVG container",
        )))
    }
}

struct DegradedOutput;

#[async_trait]
impl Strategy for DegradedOutput {
    fn name(&self) -> &str {
        DEGRADED_OUTPUT
    }

    async fn attempt(&self, ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>> {
        Ok(ctx.take_raster().map(|raster| {
            StrategyOutcome::partial("raster", vec![raster], "Returning raster image only")
        }))
    }
}

struct Emergency;

#[async_trait]
impl Strategy for Emergency {
    fn name(&self) -> &str {
        EMERGENCY
    }

    async fn attempt(&self, _ctx: &mut GenerationContext) -> Result<Option<StrategyOutcome>> {
        let mut placeholder = Artifact::svg("local", PLACEHOLDER_SVG);
        placeholder.kind = ArtifactKind::Placeholder;
        Ok(Some(StrategyOutcome::partial(
            "placeholder",
            vec![placeholder],
            "Providers unavailable; returning a placeholder",
        )))
    }
}

/// Provider capabilities wired into the five-strategy chain
pub struct GenerationPipeline {
    providers: Arc<Providers>,
    strategies: Vec<Arc<dyn Strategy>>,
    chain_timeout: Duration,
}

impl GenerationPipeline {
    pub fn builder(
        enhancer: Arc<dyn PromptEnhancer>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        vectorizer: Arc<dyn Vectorizer>,
    ) -> GenerationPipelineBuilder {
        GenerationPipelineBuilder::new(enhancer, synthesizer, vectorizer)
    }

    /// Strategy names in the order they are attempted
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn cooldown(&self) -> &Arc<CooldownManager> {
        self.providers.synthesizer.cooldown()
    }

    pub fn enhancement_cache(&self) -> &Arc<TtlLruCache<String>> {
        &self.providers.enhancement_cache
    }

    pub fn artifact_cache(&self) -> &Arc<TtlLruCache<Artifact>> {
        &self.providers.artifact_cache
    }

    /// Background TTL pruning for both caches
    pub fn spawn_cache_pruners(&self, interval: Duration) -> Vec<JoinHandle<()>> {
        vec![
            self.providers.enhancement_cache.spawn_pruner(interval),
            self.providers.artifact_cache.spawn_pruner(interval),
        ]
    }

    /// Run one request through the chain; always returns an outcome
    pub async fn generate(&self, prompt: &str, request: ImageRequest) -> StrategyOutcome {
        let mut ctx = GenerationContext::new(prompt, request);
        let outcome = run_strategy_chain(&mut ctx, &self.strategies, self.chain_timeout).await;

        let total: u64 = ctx.timings.iter().map(|t| t.duration_ms).sum();
        info!(
            "Request {} finished in {}ms via '{}' ({} steps)",
            outcome.correlation_id,
            total,
            outcome.strategy,
            ctx.timings.len()
        );
        outcome
    }
}

pub struct GenerationPipelineBuilder {
    enhancer: Arc<dyn PromptEnhancer>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    vectorizer: Arc<dyn Vectorizer>,
    clock: Arc<dyn Clock>,
    cooldown: Option<Arc<CooldownManager>>,
    cooldown_policy: CooldownPolicy,
    optimizer: Arc<dyn ArtifactOptimizer>,
    store: Option<ArtifactStore>,
    retry: RetryPolicy,
    call_timeout: Duration,
    chain_timeout: Duration,
    cache_max_items: usize,
    cache_max_age: Duration,
    max_inline_bytes: usize,
}

impl GenerationPipelineBuilder {
    fn new(
        enhancer: Arc<dyn PromptEnhancer>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        vectorizer: Arc<dyn Vectorizer>,
    ) -> Self {
        let defaults = GlyphConfig::default();
        Self {
            enhancer,
            synthesizer,
            vectorizer,
            clock: system_clock(),
            cooldown: None,
            cooldown_policy: CooldownPolicy::default(),
            optimizer: Arc::new(PassThrough),
            store: None,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_millis(defaults.http.timeout_ms),
            chain_timeout: Duration::from_millis(defaults.http.chain_timeout_ms),
            cache_max_items: defaults.cache.max_items,
            cache_max_age: Duration::from_millis(defaults.cache.max_age_ms),
            max_inline_bytes: defaults.cache.max_inline_bytes,
        }
    }

    /// Take every tunable from a loaded configuration
    pub fn config(mut self, config: &GlyphConfig) -> Self {
        self.cooldown_policy = CooldownPolicy::from_config(&config.cooldown);
        self.retry = RetryPolicy::from_config(&config.retry);
        self.call_timeout = Duration::from_millis(config.http.timeout_ms);
        self.chain_timeout = Duration::from_millis(config.http.chain_timeout_ms);
        self.cache_max_items = config.cache.max_items;
        self.cache_max_age = Duration::from_millis(config.cache.max_age_ms);
        self.max_inline_bytes = config.cache.max_inline_bytes;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing cooldown instead of creating one
    pub fn cooldown(mut self, cooldown: Arc<CooldownManager>) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn optimizer(mut self, optimizer: Arc<dyn ArtifactOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn store(mut self, store: ArtifactStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn chain_timeout(mut self, timeout: Duration) -> Self {
        self.chain_timeout = timeout;
        self
    }

    pub fn build(self) -> GenerationPipeline {
        let cooldown = self.cooldown.unwrap_or_else(|| {
            Arc::new(CooldownManager::new(self.cooldown_policy, self.clock.clone()))
        });
        let providers = Arc::new(Providers {
            enhancer: self.enhancer,
            synthesizer: MeteredSynthesizer::new(self.synthesizer, cooldown),
            vectorizer: self.vectorizer,
            optimizer: self.optimizer,
            store: self.store,
            enhancement_cache: Arc::new(TtlLruCache::new(
                self.cache_max_items,
                self.cache_max_age,
                self.clock.clone(),
            )),
            artifact_cache: Arc::new(TtlLruCache::new(
                self.cache_max_items,
                self.cache_max_age,
                self.clock.clone(),
            )),
            retry: self.retry,
            call_timeout: self.call_timeout,
            max_inline_bytes: self.max_inline_bytes,
        });

        let strategies: Vec<Arc<dyn Strategy>> = vec![
            Arc::new(Primary(providers.clone())),
            Arc::new(DirectFallback(providers.clone())),
            Arc::new(LocalFallback(providers.clone())),
            Arc::new(DegradedOutput),
            Arc::new(Emergency),
        ];

        GenerationPipeline {
            providers,
            strategies,
            chain_timeout: self.chain_timeout,
        }
    }
}
