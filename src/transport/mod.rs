//! Transport layer: the opaque model endpoint the client talks to.
//!
//! [`ModelEndpoint`] is the seam between the resilient client and whatever
//! serves the model. [`HttpModelEndpoint`] speaks a Messages-style JSON API over
//! reqwest; tests plug in scripted endpoints instead.

pub mod http;
pub mod sse;

use crate::{BoxStream, Result};
use serde::Serialize;

pub use http::{HttpEndpointConfig, HttpModelEndpoint};

pub const DEFAULT_TOP_P: f32 = 0.95;
pub const DEFAULT_TOP_K: u32 = 250;

/// One model call. Per-stage overrides (temperature, max_tokens) live here,
/// so nothing shared is mutated between stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 4096,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system.filter(|s| !s.is_empty());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait::async_trait]
pub trait ModelEndpoint: Send + Sync {
    /// Complete the request and return the full response text.
    async fn invoke(&self, request: &ModelRequest) -> Result<String>;

    /// Stream the response as text deltas. A failed item fails the whole call.
    async fn stream(&self, request: &ModelRequest) -> Result<BoxStream<'static, String>>;

    fn name(&self) -> &str {
        "model-endpoint"
    }
}
