//! Job entry point: validate an event, run the pipeline, report the outcome.
//!
//! [`Processor::handle`] never panics and never returns an error; every
//! outcome becomes a [`ProcessorResponse`] with a 200, 400 or 500 status.

use crate::config::ProcessorConfig;
use crate::pipeline::PipelineOrchestrator;
use crate::storage::{LocalObjectStore, ObjectLocation};
use crate::tracking::{noop_reporter, report_best_effort, ProgressReporter, ProgressUpdate};
use crate::transport::HttpModelEndpoint;
use crate::{Error, ErrorContext, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info};

pub const PROCESSOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A request to document one transcribed recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingEvent {
    pub execution_id: String,
    #[serde(alias = "transcription_s3_uri")]
    pub transcription_uri: String,
    #[serde(alias = "video_s3_uri")]
    pub video_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_metadata: Option<Value>,
}

impl ProcessingEvent {
    /// Validate a raw event: required fields present, non-empty, transcript URI parseable.
    pub fn from_value(raw: &Value) -> Result<Self> {
        for (field, alias) in [
            ("execution_id", None),
            ("transcription_uri", Some("transcription_s3_uri")),
            ("video_uri", Some("video_s3_uri")),
        ] {
            let present = raw
                .get(field)
                .or_else(|| alias.and_then(|a| raw.get(a)))
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty());
            if !present {
                return Err(Error::configuration_with_context(
                    format!("Missing required event field: {}", field),
                    ErrorContext::new().with_field_path(field).with_source("event"),
                ));
            }
        }

        let event: Self = serde_json::from_value(raw.clone()).map_err(|e| {
            Error::configuration_with_context(
                "Invalid event",
                ErrorContext::new().with_details(e.to_string()).with_source("event"),
            )
        })?;
        ObjectLocation::parse(&event.transcription_uri)?;
        info!(execution_id = %event.execution_id, "Event validated");
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessorResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: Value,
}

impl ProcessorResponse {
    fn new(status_code: u16, body: Value) -> Self {
        Self { status_code, body }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

pub struct Processor {
    config: ProcessorConfig,
    orchestrator: PipelineOrchestrator,
    reporter: Arc<dyn ProgressReporter>,
}

impl Processor {
    pub fn new(
        config: ProcessorConfig,
        orchestrator: PipelineOrchestrator,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            config,
            orchestrator: orchestrator.with_reporter(reporter.clone()),
            reporter,
        }
    }

    /// Wire an HTTP model endpoint and a local object store from `config`.
    pub fn from_config(config: ProcessorConfig) -> Result<Self> {
        let endpoint = Arc::new(HttpModelEndpoint::new(config.endpoint_config())?);
        let client = Arc::new(config.client_builder(endpoint).build());
        let store = Arc::new(LocalObjectStore::new(&config.storage_root));
        let orchestrator = PipelineOrchestrator::new(client, store)
            .with_chunker(crate::transcript::TranscriptChunker::new(config.max_tokens_per_chunk))
            .with_config(config.pipeline_config());
        Ok(Self::new(config, orchestrator, noop_reporter()))
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    pub async fn handle(&self, raw: &Value) -> ProcessorResponse {
        let started = Instant::now();
        info!("Processor started");

        let event = match ProcessingEvent::from_value(raw) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "Rejected event");
                return ProcessorResponse::new(
                    400,
                    json!({ "error": "ConfigurationError", "message": e.to_string() }),
                );
            }
        };
        let execution_id = event.execution_id.as_str();

        report_best_effort(
            self.reporter.as_ref(),
            execution_id,
            ProgressUpdate::processing().with_data(json!({
                "started_at": Utc::now().to_rfc3339(),
                "processor_version": PROCESSOR_VERSION,
            })),
        )
        .await;

        let result = self
            .orchestrator
            .generate(execution_id, &event.transcription_uri, &self.config.output_bucket)
            .await;

        if result.is_success() {
            let mut summary = result.summary();
            report_best_effort(
                self.reporter.as_ref(),
                execution_id,
                ProgressUpdate::completed(summary.clone()),
            )
            .await;
            summary["duration_seconds"] = json!(started.elapsed().as_secs_f64());
            summary["stages_completed"] = json!(result.stages.len());
            info!(
                execution_id,
                tokens = result.total_usage.total(),
                cost = result.cost_usd,
                "Processor completed"
            );
            return ProcessorResponse::new(200, summary);
        }

        let message = format!(
            "Processing error: {}",
            result.error.as_deref().unwrap_or("unknown failure")
        );
        report_best_effort(
            self.reporter.as_ref(),
            execution_id,
            ProgressUpdate::failed(message.clone()).with_data(result.summary()),
        )
        .await;
        error!(execution_id, error = %message, "Processor failed");
        ProcessorResponse::new(
            500,
            json!({
                "error": "ProcessingError",
                "message": message,
                "execution_id": execution_id,
                "stages": result.stages,
            }),
        )
    }
}
