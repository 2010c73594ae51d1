//! JSON-over-HTTP provider client
//!
//! Every call is bounded by the timeout guard, retried per policy, and its
//! failure sorted into the error taxonomy so the caller can decide between
//! retrying, tripping the cooldown, or falling through.

use glyph_core::{ErrorClass, GlyphError, ProviderEndpoint, Result};
use glyph_resilience::{with_retries, with_timeout, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::auth;
use crate::types::ErrorBody;

/// Statuses a metered provider uses to report depleted quota or credits
const DEFAULT_EXHAUSTED_STATUSES: &[u16] = &[402];

/// Body markers that turn a 429/403 into an exhaustion signal
const EXHAUSTED_MARKERS: &[&str] = &["quota", "credit", "insufficient", "billing"];

/// Classify a failed response
///
/// Exhaustion is only reported for metered providers; for everyone else a
/// 429 is just transient throttling.
pub fn classify_failure(
    provider: &str,
    status: u16,
    body: &str,
    metered: bool,
    exhausted_statuses: &[u16],
) -> GlyphError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect());

    if metered {
        let lowered = detail.to_lowercase();
        let marker = EXHAUSTED_MARKERS.iter().any(|m| lowered.contains(m));
        if exhausted_statuses.contains(&status) || ((status == 429 || status == 403) && marker) {
            return GlyphError::exhausted(provider, format!("HTTP {}: {}", status, detail));
        }
    }

    GlyphError::from_status(provider, status, detail)
}

/// Classify a transport-level failure (no HTTP status)
pub fn classify_transport(provider: &str, err: &reqwest::Error) -> GlyphError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        GlyphError::transient(provider, format!("transport: {}", err))
    } else if err.is_decode() {
        GlyphError::terminal(provider, format!("malformed response: {}", err))
    } else {
        GlyphError::transient(provider, err.to_string())
    }
}

/// Client for one provider endpoint
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    name: String,
    url: String,
    api_key: Option<String>,
    metered: bool,
    timeout: Duration,
    retry: RetryPolicy,
    exhausted_statuses: Vec<u16>,
    http: reqwest::Client,
}

impl HttpProviderClient {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            api_key: None,
            metered: false,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            exhausted_statuses: DEFAULT_EXHAUSTED_STATUSES.to_vec(),
            http: reqwest::Client::new(),
        }
    }

    /// Build from an endpoint section; the key comes from its env variable
    pub fn from_endpoint(endpoint: &ProviderEndpoint) -> Result<Self> {
        let url = endpoint.url.clone().ok_or_else(|| {
            GlyphError::Configuration(format!("Provider '{}' has no url configured", endpoint.name))
        })?;
        let api_key = auth::resolve_api_key(&endpoint.api_key_env)?;
        Ok(Self::new(endpoint.name.clone(), url)
            .with_api_key(api_key)
            .metered(endpoint.metered))
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn metered(mut self, metered: bool) -> Self {
        self.metered = metered;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_exhausted_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.exhausted_statuses = statuses;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_metered(&self) -> bool {
        self.metered
    }

    /// POST `body` and decode the JSON response
    pub async fn post_json<B, R>(&self, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let label = format!("{} request", self.name);
        with_retries(
            |attempt| {
                tracing::debug!("Calling {} (attempt {})", self.name, attempt + 1);
                with_timeout(self.send_once(body), self.timeout, &label)
            },
            &self.retry,
        )
        .await
    }

    async fn send_once<B, R>(&self, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.http.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(&self.name, &e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            let err = classify_failure(
                &self.name,
                status.as_u16(),
                &text,
                self.metered,
                &self.exhausted_statuses,
            );
            if err.class() == ErrorClass::Exhausted {
                tracing::warn!("{} reported exhaustion: {}", self.name, err);
            }
            return Err(err);
        }

        response.json::<R>().await.map_err(|e| {
            GlyphError::terminal(&self.name, format!("malformed response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metered_quota_is_exhausted() {
        let err = classify_failure(
            "synthesizer",
            429,
            r#"{"error":"Monthly quota exceeded"}"#,
            true,
            DEFAULT_EXHAUSTED_STATUSES,
        );
        assert!(err.is_exhausted());
        assert!(err.to_string().contains("Monthly quota exceeded"));
    }

    #[test]
    fn test_payment_required_is_exhausted_for_metered() {
        let err = classify_failure("synthesizer", 402, "", true, DEFAULT_EXHAUSTED_STATUSES);
        assert!(err.is_exhausted());
    }

    #[test]
    fn test_plain_throttling_is_transient() {
        let err = classify_failure(
            "synthesizer",
            429,
            r#"{"message":"slow down"}"#,
            true,
            DEFAULT_EXHAUSTED_STATUSES,
        );
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_unmetered_never_exhausted() {
        let err = classify_failure(
            "enhancer",
            429,
            r#"{"error":"quota"}"#,
            false,
            DEFAULT_EXHAUSTED_STATUSES,
        );
        assert_eq!(err.class(), ErrorClass::Transient);

        let err = classify_failure("enhancer", 402, "", false, DEFAULT_EXHAUSTED_STATUSES);
        assert_eq!(err.class(), ErrorClass::Terminal);
    }

    #[test]
    fn test_auth_failure_is_terminal() {
        let err = classify_failure("vectorizer", 401, "unauthorized", false, &[]);
        assert_eq!(err.class(), ErrorClass::Terminal);
    }

    #[test]
    fn test_endpoint_without_url_is_configuration_error() {
        let endpoint = ProviderEndpoint {
            name: "vectorizer".to_string(),
            url: None,
            api_key_env: "GLYPH_TEST_UNUSED".to_string(),
            metered: false,
        };
        let err = HttpProviderClient::from_endpoint(&endpoint).unwrap_err();
        assert!(matches!(err, GlyphError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_surfaces_transient_error() {
        let client = HttpProviderClient::new("enhancer", "http://127.0.0.1:9/enhance")
            .with_timeout(Duration::from_secs(2))
            .with_retry_policy(RetryPolicy::no_retry());
        let result: Result<serde_json::Value> =
            client.post_json(&serde_json::json!({"prompt": "x"})).await;
        let err = result.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {}", err);
    }
}
