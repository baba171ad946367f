use crate::cancel::CancelScope;
use crate::client::audit::AuditLog;
use crate::client::policy::{Decision, RetryPolicy};
use crate::client::signals::ClientSignals;
use crate::client::structured;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot};
use crate::resilience::rate_limiter::RateLimiter;
use crate::tokens::{estimate_tokens, ModelPricing, TokenUsage};
use crate::transport::{ModelEndpoint, ModelRequest};
use crate::{Error, Result};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Per-chunk callback for streamed output.
pub type ChunkCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Generation defaults applied when a call does not override them.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            top_p: crate::transport::DEFAULT_TOP_P,
            top_k: crate::transport::DEFAULT_TOP_K,
        }
    }
}

/// Per-call options. Everything here is request-scoped.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Label for logs and the audit file name.
    pub stage: Option<String>,
    pub scope: CancelScope,
}

impl InvokeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn scope(mut self, scope: CancelScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Single choke point for every call to the generation model.
///
/// Each call is paced by the rate limiter, gated by the circuit breaker (when
/// configured) and retried with exponential backoff inside the breaker, so one
/// failed `invoke` counts as one breaker failure however many attempts it took.
/// Token usage is estimated with the `chars / 4` heuristic and accumulated
/// across calls until [`reset_usage`](Self::reset_usage).
///
/// One client belongs to one pipeline worker; its limiter, breaker and usage
/// totals are not meant to be shared across concurrent pipelines.
pub struct ModelClient {
    pub(crate) endpoint: Arc<dyn ModelEndpoint>,
    pub(crate) model_id: String,
    pub(crate) defaults: GenerationDefaults,
    pub(crate) policy: RetryPolicy,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) breaker: Option<CircuitBreaker>,
    pub(crate) pricing: ModelPricing,
    pub(crate) usage: Mutex<TokenUsage>,
    pub(crate) audit: Mutex<Option<Arc<AuditLog>>>,
}

impl ModelClient {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn request(&self, prompt: &str, opts: &InvokeOptions) -> ModelRequest {
        ModelRequest {
            model: self.model_id.clone(),
            system: opts.system_prompt.clone().filter(|s| !s.is_empty()),
            prompt: prompt.to_string(),
            temperature: opts.temperature.unwrap_or(self.defaults.temperature),
            max_tokens: opts.max_tokens.unwrap_or(self.defaults.max_tokens),
            top_p: self.defaults.top_p,
            top_k: self.defaults.top_k,
        }
    }

    fn input_tokens(request: &ModelRequest) -> usize {
        estimate_tokens(&request.prompt) + request.system.as_deref().map(estimate_tokens).unwrap_or(0)
    }

    fn record_usage(&self, usage: TokenUsage) {
        let mut total = self.usage.lock().unwrap_or_else(|p| p.into_inner());
        *total += usage;
    }

    fn audit_log(&self) -> Option<Arc<AuditLog>> {
        self.audit.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn audit(
        &self,
        stage: &str,
        request: &ModelRequest,
        outcome: std::result::Result<&str, &Error>,
        usage: Option<TokenUsage>,
    ) {
        if let Some(log) = self.audit_log() {
            log.record(stage, request, outcome, usage).await;
        }
    }

    /// Run `f` through the breaker when one is configured.
    async fn gated<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match &self.breaker {
            Some(breaker) => breaker.call(f).await,
            None => f().await,
        }
    }

    async fn invoke_with_retry(&self, request: &ModelRequest, scope: &CancelScope) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            let err = match scope.run(self.endpoint.invoke(request)).await? {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            match self.policy.decide(&err, attempt) {
                Decision::Retry { delay } => {
                    let (name, _) = err.signature();
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        error_name = %name,
                        error = %err,
                        "Model call failed, retrying"
                    );
                    scope.sleep(delay).await?;
                    attempt += 1;
                }
                Decision::Fail => {
                    if err.is_retryable() {
                        error!(attempts = attempt + 1, error = %err, "All retries failed");
                    } else {
                        error!(error = %err, "Model call failed with non-retryable error");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Invoke the model and return its text with the estimated usage of this call.
    pub async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<(String, TokenUsage)> {
        let request = self.request(prompt, opts);
        let stage = opts.stage.as_deref().unwrap_or("invoke");
        info!(
            stage,
            prompt_chars = prompt.chars().count(),
            max_tokens = request.max_tokens,
            temperature = request.temperature,
            "Invoking model"
        );

        self.rate_limiter
            .acquire(estimate_tokens(prompt) as u64, &opts.scope)
            .await?;

        let outcome = self
            .gated(|| self.invoke_with_retry(&request, &opts.scope))
            .await;

        match outcome {
            Ok(text) => {
                let usage = TokenUsage::new(Self::input_tokens(&request), estimate_tokens(&text));
                self.record_usage(usage);
                info!(
                    stage,
                    response_chars = text.chars().count(),
                    tokens = usage.total(),
                    cost = usage.cost(&self.pricing),
                    "Model response received"
                );
                self.audit(stage, &request, Ok(&text), Some(usage)).await;
                Ok((text, usage))
            }
            Err(e) => {
                self.audit(stage, &request, Err(&e), None).await;
                Err(e)
            }
        }
    }

    /// Stream the response, handing each chunk to `callback` as it arrives.
    ///
    /// There is no per-chunk retry: a failed stream fails the whole call.
    /// Usage is accounted once the stream completes.
    pub async fn invoke_streaming(
        &self,
        prompt: &str,
        opts: &InvokeOptions,
        callback: Option<ChunkCallback<'_>>,
    ) -> Result<(String, TokenUsage)> {
        let request = self.request(prompt, opts);
        let stage = opts.stage.as_deref().unwrap_or("stream");
        info!(stage, prompt_chars = prompt.chars().count(), "Invoking model with streaming");

        self.rate_limiter
            .acquire(estimate_tokens(prompt) as u64, &opts.scope)
            .await?;

        let outcome = self
            .gated(|| async {
                let scope = &opts.scope;
                let mut stream = scope.run(self.endpoint.stream(&request)).await??;
                let mut full = String::new();
                while let Some(chunk) = scope.run(stream.next()).await? {
                    let chunk = chunk?;
                    if let Some(cb) = callback {
                        cb(&chunk);
                    }
                    full.push_str(&chunk);
                }
                Ok(full)
            })
            .await;

        match outcome {
            Ok(text) => {
                let usage = TokenUsage::new(Self::input_tokens(&request), estimate_tokens(&text));
                self.record_usage(usage);
                info!(
                    stage,
                    response_chars = text.chars().count(),
                    tokens = usage.total(),
                    "Streaming complete"
                );
                self.audit(stage, &request, Ok(&text), Some(usage)).await;
                Ok((text, usage))
            }
            Err(e) => {
                error!(stage, error = %e, "Streaming failed");
                self.audit(stage, &request, Err(&e), None).await;
                Err(e)
            }
        }
    }

    /// Invoke and parse the response as JSON, stripping an optional code fence.
    ///
    /// The call's usage is recorded even when parsing fails.
    pub async fn invoke_json(&self, prompt: &str, opts: &InvokeOptions) -> Result<(Value, TokenUsage)> {
        let (text, usage) = self.invoke(prompt, opts).await?;
        let value = structured::parse_json_output(&text).map_err(|e| {
            error!(stage = opts.stage.as_deref().unwrap_or("invoke"), error = %e, "Model returned malformed JSON");
            e
        })?;
        Ok((value, usage))
    }

    /// Typed variant of [`invoke_json`](Self::invoke_json).
    pub async fn invoke_json_as<T: DeserializeOwned>(
        &self,
        prompt: &str,
        opts: &InvokeOptions,
    ) -> Result<(T, TokenUsage)> {
        let (text, usage) = self.invoke(prompt, opts).await?;
        let value = structured::parse_json_output_as(&text)?;
        Ok((value, usage))
    }

    pub fn total_usage(&self) -> TokenUsage {
        *self.usage.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn total_cost(&self) -> f64 {
        self.total_usage().cost(&self.pricing)
    }

    pub fn reset_usage(&self) {
        *self.usage.lock().unwrap_or_else(|p| p.into_inner()) = TokenUsage::default();
    }

    pub fn pricing(&self) -> &ModelPricing {
        &self.pricing
    }

    /// Point audit records at `dir`, or stop auditing with `None`.
    pub fn set_audit_dir(&self, dir: Option<PathBuf>) {
        self.set_audit_log(dir.map(AuditLog::new));
    }

    /// Replace the audit log; its sequence numbering starts over.
    pub fn set_audit_log(&self, log: Option<AuditLog>) {
        *self.audit.lock().unwrap_or_else(|p| p.into_inner()) = log.map(Arc::new);
    }

    pub fn audit_dir(&self) -> Option<PathBuf> {
        self.audit_log().map(|log| log.dir().to_path_buf())
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    pub fn circuit_breaker_state(&self) -> Option<CircuitBreakerSnapshot> {
        self.breaker.as_ref().map(CircuitBreaker::snapshot)
    }

    pub async fn signals(&self) -> ClientSignals {
        ClientSignals {
            total_usage: self.total_usage(),
            total_cost: self.total_cost(),
            rate_limiter: self.rate_limiter.snapshot().await,
            circuit_breaker: self.circuit_breaker_state(),
        }
    }
}
