//! Axum HTTP surface for the generation pipeline

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use glyph_core::ImageRequest;
use glyph_orchestrator::GenerationPipeline;
use glyph_resilience::{Admission, RateLimiter};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared application state
pub struct AppState {
    pub pipeline: GenerationPipeline,
    pub limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/health", get(health))
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(state: SharedState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await?;
    Ok(())
}

/// Limiter key: the caller's API key when sent, otherwise its address
fn client_key(headers: &HeaderMap, addr: &SocketAddr) -> String {
    match headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        Some(key) => format!("key:{}", key),
        None => format!("ip:{}", addr.ip()),
    }
}

fn rate_limit_headers(admission: &Admission) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from(admission.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(admission.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(admission.reset_seconds));
    if let Some(retry_after) = admission.retry_after {
        headers.insert("retry-after", HeaderValue::from(retry_after));
    }
    headers
}

fn error_body(error: &str, message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "error": error,
        "message": message,
    }))
}

/// POST /api/generate
async fn generate(
    State(app): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<GenerateBody>,
) -> Response {
    let key = client_key(&headers, &addr);
    let admission = app.limiter.admit(&key).await;
    let limit_headers = rate_limit_headers(&admission);

    if !admission.allowed {
        warn!("Rate limited {} for {}s", key, admission.reset_seconds);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            limit_headers,
            error_body("rate_limited", "Too many requests, retry later"),
        )
            .into_response();
    }

    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            limit_headers,
            error_body("invalid_request", "prompt must not be empty"),
        )
            .into_response();
    }

    let mut request = ImageRequest::default();
    if let Some(size) = body.size.filter(|s| !s.trim().is_empty()) {
        request.size = size;
    }
    request.style = body.style.filter(|s| !s.trim().is_empty());

    debug!("Generating for {}", key);
    let outcome = app.pipeline.generate(prompt, request).await;
    if outcome.is_critical() {
        warn!("Serving critical outcome {} to {}", outcome.correlation_id, key);
    }

    // The critical outcome is a well-formed answer; callers read `success`
    (StatusCode::OK, limit_headers, Json(outcome)).into_response()
}

/// GET /api/health
async fn health(State(app): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "glyph",
        "synthesizer_cooldown": app.pipeline.cooldown().is_in_cooldown(),
        "strategies": app.pipeline.strategy_names(),
    }))
}
