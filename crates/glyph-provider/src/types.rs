//! Request and response bodies for the provider gateway contract
//!
//! Every upstream sits behind a gateway that speaks this small JSON shape;
//! vendor-specific payloads are the gateway's concern.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct EnhanceRequest<'a> {
    pub prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhanceResponse {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesizeRequest<'a> {
    pub prompt: &'a str,
    pub size: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesizeResponse {
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorizeRequest<'a> {
    pub image_url: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorizeResponse {
    pub svg: String,
}

/// Error body some gateways return alongside a failure status
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn detail(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}
