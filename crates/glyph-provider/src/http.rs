//! Gateway-backed implementations of the provider capabilities

use async_trait::async_trait;
use glyph_core::{Artifact, GlyphError, ImageRequest, Result};

use crate::capability::{ImageSynthesizer, PromptEnhancer, Vectorizer};
use crate::client::HttpProviderClient;
use crate::types::{
    EnhanceRequest, EnhanceResponse, SynthesizeRequest, SynthesizeResponse, VectorizeRequest,
    VectorizeResponse,
};

/// Language-model prompt enhancer behind the gateway
pub struct HttpPromptEnhancer {
    client: HttpProviderClient,
}

impl HttpPromptEnhancer {
    pub fn new(client: HttpProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PromptEnhancer for HttpPromptEnhancer {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn enhance(&self, prompt: &str) -> Result<String> {
        let response: EnhanceResponse = self.client.post_json(&EnhanceRequest { prompt }).await?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(GlyphError::terminal(
                self.client.name(),
                "malformed response: empty text",
            ));
        }
        Ok(text.to_string())
    }
}

/// Raster image synthesizer behind the gateway
pub struct HttpImageSynthesizer {
    client: HttpProviderClient,
}

impl HttpImageSynthesizer {
    pub fn new(client: HttpProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageSynthesizer for HttpImageSynthesizer {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn synthesize(&self, prompt: &str, request: &ImageRequest) -> Result<Artifact> {
        let body = SynthesizeRequest {
            prompt,
            size: &request.size,
            style: request.style.as_deref(),
        };
        let response: SynthesizeResponse = self.client.post_json(&body).await?;
        if response.url.trim().is_empty() {
            return Err(GlyphError::terminal(
                self.client.name(),
                "malformed response: empty url",
            ));
        }

        let mut artifact = Artifact::raster_url(self.client.name(), response.url);
        if let Some(mime) = response.mime_type {
            artifact.mime_type = mime;
        }
        Ok(artifact)
    }
}

/// Raster-to-vector converter behind the gateway
pub struct HttpVectorizer {
    client: HttpProviderClient,
}

impl HttpVectorizer {
    pub fn new(client: HttpProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Vectorizer for HttpVectorizer {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn vectorize(&self, raster: &Artifact) -> Result<Artifact> {
        let image_url = raster.url.as_deref().ok_or_else(|| {
            GlyphError::terminal(self.client.name(), "raster artifact has no url")
        })?;
        let response: VectorizeResponse =
            self.client.post_json(&VectorizeRequest { image_url }).await?;
        if !response.svg.contains("<svg") {
            return Err(GlyphError::terminal(
                self.client.name(),
                "malformed response: svg markup missing",
            ));
        }
        Ok(Artifact::svg(self.client.name(), response.svg))
    }
}
