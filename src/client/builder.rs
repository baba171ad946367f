use crate::client::audit::AuditLog;
use crate::client::core::{GenerationDefaults, ModelClient};
use crate::client::policy::RetryPolicy;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::tokens::{ModelPricing, TokenUsage};
use crate::transport::ModelEndpoint;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const DEFAULT_MODEL_ID: &str = "claude-sonnet-4-5";

/// Builder for a [`ModelClient`].
///
/// The circuit breaker is on by default with the stock quota signatures;
/// call [`without_circuit_breaker`](Self::without_circuit_breaker) to call the
/// endpoint directly.
pub struct ModelClientBuilder {
    endpoint: Arc<dyn ModelEndpoint>,
    model_id: String,
    defaults: GenerationDefaults,
    policy: RetryPolicy,
    rate_limiter: RateLimiterConfig,
    breaker: Option<CircuitBreakerConfig>,
    pricing: ModelPricing,
    audit_dir: Option<PathBuf>,
}

impl ModelClientBuilder {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>) -> Self {
        Self {
            endpoint,
            model_id: DEFAULT_MODEL_ID.to_string(),
            defaults: GenerationDefaults::default(),
            policy: RetryPolicy::default(),
            rate_limiter: RateLimiterConfig::default(),
            breaker: Some(CircuitBreakerConfig::default()),
            pricing: ModelPricing::default(),
            audit_dir: None,
        }
    }

    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.defaults.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.defaults.max_tokens = max_tokens;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries.max(1);
        self
    }

    pub fn rate_limits(mut self, requests_per_minute: u32, tokens_per_minute: u64) -> Self {
        self.rate_limiter = RateLimiterConfig::new()
            .with_requests_per_minute(requests_per_minute)
            .with_tokens_per_minute(tokens_per_minute);
        self
    }

    pub fn circuit_breaker(mut self, cfg: CircuitBreakerConfig) -> Self {
        self.breaker = Some(cfg);
        self
    }

    pub fn without_circuit_breaker(mut self) -> Self {
        self.breaker = None;
        self
    }

    pub fn pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn audit_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.audit_dir = dir;
        self
    }

    pub fn build(self) -> ModelClient {
        ModelClient {
            endpoint: self.endpoint,
            model_id: self.model_id,
            defaults: self.defaults,
            policy: self.policy,
            rate_limiter: RateLimiter::new(self.rate_limiter),
            breaker: self.breaker.map(CircuitBreaker::new),
            pricing: self.pricing,
            usage: Mutex::new(TokenUsage::default()),
            audit: Mutex::new(self.audit_dir.map(|d| Arc::new(AuditLog::new(d)))),
        }
    }
}
