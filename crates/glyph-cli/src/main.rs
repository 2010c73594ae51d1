//! Glyph CLI - resilient AI vector-artwork generation
//!
//! Usage:
//!   glyph generate <prompt>     Run one request through the pipeline
//!   glyph serve                 Start the HTTP API
//!   glyph janitor once|watch    Clean the shared artifact directory
//!   glyph config show|init      Inspect or write configuration

mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glyph_core::{system_clock, GlyphConfig, ImageRequest, ProviderEndpoint};
use glyph_janitor::Janitor;
use glyph_orchestrator::GenerationPipeline;
use glyph_provider::{
    optimizer_from_config, ArtifactStore, HttpImageSynthesizer, HttpPromptEnhancer,
    HttpProviderClient, HttpVectorizer,
};
use glyph_resilience::{RateLimiter, RetryPolicy};
use glyph_store::{Database, DurableDirLock, DurableWindowStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "glyph")]
#[command(author, version, about = "Resilient AI vector-artwork generation")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding .glyph/config.toml
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate artwork for a prompt and print the outcome as JSON
    Generate {
        prompt: String,

        /// Raster size, e.g. 1024x1024
        #[arg(long)]
        size: Option<String>,

        #[arg(long)]
        style: Option<String>,
    },

    /// Start the HTTP API
    Serve {
        /// Listen address (defaults to server.addr from config)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Artifact directory cleanup
    Janitor {
        #[command(subcommand)]
        action: JanitorCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum JanitorCommands {
    /// Run a single cleanup pass
    Once,

    /// Run passes on the jittered schedule until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default .glyph/config.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Config {
            action: ConfigCommands::Init,
        } => cmd_config_init(&cli.root),
        command => {
            let config = GlyphConfig::load(&cli.root).context("Failed to load configuration")?;
            match command {
                Commands::Generate {
                    prompt,
                    size,
                    style,
                } => cmd_generate(&config, prompt, size, style).await,
                Commands::Serve { addr } => cmd_serve(&config, addr).await,
                Commands::Janitor { action } => cmd_janitor(&config, action).await,
                Commands::Config { .. } => cmd_config_show(&config),
            }
        }
    }
}

fn provider_client(endpoint: &ProviderEndpoint, config: &GlyphConfig) -> Result<HttpProviderClient> {
    let client = HttpProviderClient::from_endpoint(endpoint)
        .with_context(|| format!("Provider '{}' is not usable", endpoint.name))?;
    // Retries and deadlines are applied per call by the pipeline
    Ok(client
        .with_timeout(Duration::from_millis(config.http.timeout_ms))
        .with_retry_policy(RetryPolicy::no_retry()))
}

fn build_pipeline(config: &GlyphConfig) -> Result<GenerationPipeline> {
    let providers = &config.providers;
    let enhancer = HttpPromptEnhancer::new(provider_client(&providers.enhancer, config)?);
    let synthesizer = HttpImageSynthesizer::new(provider_client(&providers.synthesizer, config)?);
    let vectorizer = HttpVectorizer::new(provider_client(&providers.vectorizer, config)?);
    let optimizer = optimizer_from_config(&providers.optimizer)?;

    Ok(GenerationPipeline::builder(
        Arc::new(enhancer),
        Arc::new(synthesizer),
        Arc::new(vectorizer),
    )
    .config(config)
    .optimizer(optimizer)
    .store(ArtifactStore::new(&config.janitor.dir))
    .build())
}

/// Durable backend when configured; `None` degrades to in-memory state
async fn open_store(config: &GlyphConfig) -> Option<Arc<Database>> {
    let path = config.rate_limit.store_path.as_ref()?;
    match Database::open(path).await {
        Ok(db) => {
            info!("Using durable store at {}", path.display());
            Some(Arc::new(db))
        }
        Err(e) => {
            warn!("Durable store unavailable, using in-memory state: {}", e);
            None
        }
    }
}

fn build_janitor(config: &GlyphConfig, db: Option<Arc<Database>>) -> Janitor {
    match db {
        Some(db) => {
            let lock = DurableDirLock::new(
                db,
                config.janitor.dir.to_string_lossy(),
                Duration::from_millis(config.janitor.stale_lock_ms),
                system_clock(),
            );
            Janitor::with_lock(config.janitor.clone(), Arc::new(lock))
        }
        None => Janitor::new(config.janitor.clone()),
    }
}

async fn cmd_generate(
    config: &GlyphConfig,
    prompt: String,
    size: Option<String>,
    style: Option<String>,
) -> Result<()> {
    let prompt = prompt.trim();
    anyhow::ensure!(!prompt.is_empty(), "prompt must not be empty");

    let pipeline = build_pipeline(config)?;
    let mut request = ImageRequest::default();
    if let Some(size) = size {
        request.size = size;
    }
    request.style = style;

    let outcome = pipeline.generate(prompt, request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.is_critical() {
        anyhow::bail!("No strategy produced a result ({})", outcome.correlation_id);
    }
    Ok(())
}

async fn cmd_serve(config: &GlyphConfig, addr: Option<String>) -> Result<()> {
    let addr = addr.unwrap_or_else(|| config.server.addr.clone());
    let pipeline = build_pipeline(config)?;
    let db = open_store(config).await;

    let mut limiter = RateLimiter::from_config(&config.rate_limit, system_clock());
    if let Some(db) = &db {
        limiter = limiter.with_store(Arc::new(DurableWindowStore::new(db.clone())));
    }

    let janitor = Arc::new(build_janitor(config, db));
    janitor.start_scheduled(config.janitor.interval());

    let prune_interval = Duration::from_millis(config.cache.prune_interval_ms);
    let pruners = pipeline.spawn_cache_pruners(prune_interval);

    let state = Arc::new(server::AppState { pipeline, limiter });

    let sweeper = {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(state.limiter.window());
            loop {
                ticker.tick().await;
                let dropped = state.limiter.sweep();
                if dropped > 0 {
                    tracing::debug!("Dropped {} idle rate-limit windows", dropped);
                }
            }
        })
    };

    let result = server::serve(state, &addr).await;

    sweeper.abort();
    for pruner in pruners {
        pruner.abort();
    }
    janitor.stop().await;
    result
}

async fn cmd_janitor(config: &GlyphConfig, action: JanitorCommands) -> Result<()> {
    let db = open_store(config).await;
    let janitor = Arc::new(build_janitor(config, db));

    match action {
        JanitorCommands::Once => {
            let report = janitor.run_once().await.context("Cleanup pass failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        JanitorCommands::Watch => {
            janitor.start_scheduled(config.janitor.interval());
            println!(
                "Watching {} (Ctrl-C to stop)",
                janitor.dir().display()
            );
            tokio::signal::ctrl_c().await?;
            janitor.stop().await;
        }
    }
    Ok(())
}

fn cmd_config_show(config: &GlyphConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

fn cmd_config_init(root: &Path) -> Result<()> {
    let path = GlyphConfig::write_default(root).context("Failed to write configuration")?;
    println!("Created {}", path.display());
    Ok(())
}
