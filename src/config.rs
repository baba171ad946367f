//! Processor configuration.
//!
//! Values come from an optional YAML file named by `DOCGEN_CONFIG`, then
//! `DOCGEN_*` environment variables on top. `DOCGEN_OUTPUT_BUCKET` is required.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DOCGEN_OUTPUT_BUCKET` | required |
//! | `DOCGEN_TRACKING_TABLE` | none |
//! | `DOCGEN_MODEL_ID` | `claude-sonnet-4-5` |
//! | `DOCGEN_MODEL_BASE_URL` | `https://api.anthropic.com` |
//! | `DOCGEN_MODEL_API_KEY` | none |
//! | `DOCGEN_MAX_TOKENS_PER_CHUNK` | 100000 |
//! | `DOCGEN_MAX_OUTPUT_TOKENS` | 64000 |
//! | `DOCGEN_TEMPERATURE` | 0.7 |
//! | `DOCGEN_MAX_RETRIES` | 3 |
//! | `DOCGEN_RATE_LIMIT_RPM` / `DOCGEN_RATE_LIMIT_TPM` | 10 / 100000 |
//! | `DOCGEN_BREAKER_FAILURE_THRESHOLD` / `DOCGEN_BREAKER_TIMEOUT_SECS` | 5 / 300 |
//! | `DOCGEN_HTTP_TIMEOUT_SECS` | 600 |
//! | `DOCGEN_PIPELINE_DEADLINE_SECS` | none |
//! | `DOCGEN_AUDIT_DIR` | none |
//! | `DOCGEN_STORAGE_ROOT` | `./data` |
//! | `DOCGEN_LOG_LEVEL` | `info` |

use crate::client::{ModelClientBuilder, RetryPolicy, DEFAULT_MODEL_ID};
use crate::pipeline::{PipelineConfig, StageBudget, DEFAULT_MAX_OUTPUT_TOKENS};
use crate::resilience::CircuitBreakerConfig;
use crate::transcript::chunker::DEFAULT_MAX_TOKENS_PER_CHUNK;
use crate::transport::{HttpEndpointConfig, ModelEndpoint};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const CONFIG_FILE_VAR: &str = "DOCGEN_CONFIG";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub output_bucket: String,
    pub tracking_table: Option<String>,
    pub model_id: String,
    pub model_base_url: String,
    #[serde(skip_serializing)]
    pub model_api_key: Option<String>,
    pub max_tokens_per_chunk: usize,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
    pub rate_limit_rpm: u32,
    pub rate_limit_tpm: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub pipeline_deadline_secs: Option<u64>,
    pub audit_dir: Option<PathBuf>,
    pub storage_root: PathBuf,
    pub log_level: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            output_bucket: String::new(),
            tracking_table: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_base_url: DEFAULT_BASE_URL.to_string(),
            model_api_key: None,
            max_tokens_per_chunk: DEFAULT_MAX_TOKENS_PER_CHUNK,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: 0.7,
            max_retries: 3,
            rate_limit_rpm: 10,
            rate_limit_tpm: 100_000,
            breaker_failure_threshold: 5,
            breaker_timeout_secs: 300,
            http_timeout_secs: 600,
            pipeline_deadline_secs: None,
            audit_dir: None,
            storage_root: PathBuf::from("./data"),
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        Error::configuration_with_context(
            format!("Invalid value for {}: {:?}", name, raw),
            ErrorContext::new()
                .with_field_path(name)
                .with_details(e.to_string())
                .with_source("config"),
        )
    })
}

impl ProcessorConfig {
    /// Load from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load with a custom variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut cfg = match get(CONFIG_FILE_VAR) {
            Some(path) => Self::from_yaml_file(&path)?,
            None => Self::default(),
        };

        if let Some(v) = get("DOCGEN_OUTPUT_BUCKET") {
            cfg.output_bucket = v;
        }
        if let Some(v) = get("DOCGEN_TRACKING_TABLE") {
            cfg.tracking_table = Some(v);
        }
        if let Some(v) = get("DOCGEN_MODEL_ID") {
            cfg.model_id = v;
        }
        if let Some(v) = get("DOCGEN_MODEL_BASE_URL") {
            cfg.model_base_url = v;
        }
        if let Some(v) = get("DOCGEN_MODEL_API_KEY") {
            cfg.model_api_key = Some(v);
        }
        if let Some(v) = get("DOCGEN_MAX_TOKENS_PER_CHUNK") {
            cfg.max_tokens_per_chunk = parse_var("DOCGEN_MAX_TOKENS_PER_CHUNK", &v)?;
        }
        if let Some(v) = get("DOCGEN_MAX_OUTPUT_TOKENS") {
            cfg.max_output_tokens = parse_var("DOCGEN_MAX_OUTPUT_TOKENS", &v)?;
        }
        if let Some(v) = get("DOCGEN_TEMPERATURE") {
            cfg.temperature = parse_var("DOCGEN_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("DOCGEN_MAX_RETRIES") {
            cfg.max_retries = parse_var("DOCGEN_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("DOCGEN_RATE_LIMIT_RPM") {
            cfg.rate_limit_rpm = parse_var("DOCGEN_RATE_LIMIT_RPM", &v)?;
        }
        if let Some(v) = get("DOCGEN_RATE_LIMIT_TPM") {
            cfg.rate_limit_tpm = parse_var("DOCGEN_RATE_LIMIT_TPM", &v)?;
        }
        if let Some(v) = get("DOCGEN_BREAKER_FAILURE_THRESHOLD") {
            cfg.breaker_failure_threshold = parse_var("DOCGEN_BREAKER_FAILURE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("DOCGEN_BREAKER_TIMEOUT_SECS") {
            cfg.breaker_timeout_secs = parse_var("DOCGEN_BREAKER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("DOCGEN_HTTP_TIMEOUT_SECS") {
            cfg.http_timeout_secs = parse_var("DOCGEN_HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("DOCGEN_PIPELINE_DEADLINE_SECS") {
            cfg.pipeline_deadline_secs = Some(parse_var("DOCGEN_PIPELINE_DEADLINE_SECS", &v)?);
        }
        if let Some(v) = get("DOCGEN_AUDIT_DIR") {
            cfg.audit_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DOCGEN_STORAGE_ROOT") {
            cfg.storage_root = PathBuf::from(v);
        }
        if let Some(v) = get("DOCGEN_LOG_LEVEL") {
            cfg.log_level = v;
        }

        cfg.validate()?;
        info!(
            model_id = %cfg.model_id,
            output_bucket = %cfg.output_bucket,
            max_tokens_per_chunk = cfg.max_tokens_per_chunk,
            max_output_tokens = cfg.max_output_tokens,
            "Configuration loaded"
        );
        Ok(cfg)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                "Invalid configuration file",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config"),
            )
        })
    }

    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("Cannot read configuration file {}", path),
                ErrorContext::new()
                    .with_field_path(CONFIG_FILE_VAR)
                    .with_details(e.to_string())
                    .with_source("config"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: &str| {
            Err(Error::configuration_with_context(
                msg.to_string(),
                ErrorContext::new().with_field_path(field).with_source("config"),
            ))
        };

        if self.output_bucket.trim().is_empty() {
            return invalid(
                "DOCGEN_OUTPUT_BUCKET",
                "Missing required environment variable: DOCGEN_OUTPUT_BUCKET",
            );
        }
        if self.model_id.trim().is_empty() {
            return invalid("DOCGEN_MODEL_ID", "Model id must not be empty");
        }
        if self.max_tokens_per_chunk == 0 {
            return invalid("DOCGEN_MAX_TOKENS_PER_CHUNK", "Chunk token limit must be positive");
        }
        if self.max_output_tokens == 0 {
            return invalid("DOCGEN_MAX_OUTPUT_TOKENS", "Output token limit must be positive");
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return invalid("DOCGEN_TEMPERATURE", "Temperature must be within [0, 1]");
        }
        if self.max_retries == 0 {
            return invalid("DOCGEN_MAX_RETRIES", "At least one attempt is required");
        }
        if self.rate_limit_rpm == 0 || self.rate_limit_tpm == 0 {
            return invalid("DOCGEN_RATE_LIMIT_RPM", "Rate limits must be positive");
        }
        if self.breaker_failure_threshold == 0 {
            return invalid(
                "DOCGEN_BREAKER_FAILURE_THRESHOLD",
                "Breaker failure threshold must be positive",
            );
        }
        if self.http_timeout_secs == 0 {
            return invalid("DOCGEN_HTTP_TIMEOUT_SECS", "HTTP timeout must be positive");
        }
        if self.pipeline_deadline_secs == Some(0) {
            return invalid("DOCGEN_PIPELINE_DEADLINE_SECS", "Pipeline deadline must be positive");
        }
        Ok(())
    }

    pub fn endpoint_config(&self) -> HttpEndpointConfig {
        HttpEndpointConfig::new(&self.model_base_url)
            .with_api_key(self.model_api_key.clone())
            .with_timeout(Duration::from_secs(self.http_timeout_secs))
    }

    /// Client builder carrying every resilience knob of this config.
    pub fn client_builder(&self, endpoint: Arc<dyn ModelEndpoint>) -> ModelClientBuilder {
        ModelClientBuilder::new(endpoint)
            .model_id(&self.model_id)
            .temperature(self.temperature)
            .retry_policy(RetryPolicy::new(self.max_retries))
            .rate_limits(self.rate_limit_rpm, self.rate_limit_tpm)
            .circuit_breaker(
                CircuitBreakerConfig::new()
                    .with_failure_threshold(self.breaker_failure_threshold)
                    .with_timeout(Duration::from_secs(self.breaker_timeout_secs)),
            )
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_budget(StageBudget::from_max_output(self.max_output_tokens))
            .with_deadline(self.pipeline_deadline_secs.map(Duration::from_secs))
            .with_audit_root(self.audit_dir.clone())
    }
}
