//! Job handling: event validation, status codes and tracking updates.

mod common;

use common::StageEndpoint;
use serde_json::json;
use std::sync::Arc;
use transcript_docgen::client::ModelClientBuilder;
use transcript_docgen::config::ProcessorConfig;
use transcript_docgen::error_code::ProviderErrorKind;
use transcript_docgen::pipeline::{PipelineOrchestrator, StageId};
use transcript_docgen::processor::{Processor, PROCESSOR_VERSION};
use transcript_docgen::storage::{InMemoryObjectStore, ObjectLocation};
use transcript_docgen::tracking::{InMemoryReporter, ProgressReporter, ProgressStatus, ProgressUpdate};
use transcript_docgen::{Error, Result};

fn processor(endpoint: Arc<StageEndpoint>, reporter: Arc<dyn ProgressReporter>) -> (Processor, Arc<InMemoryObjectStore>) {
    let store = Arc::new(InMemoryObjectStore::new());
    store.insert(
        ObjectLocation::new("media", "transcripts/exec-1.json"),
        serde_json::to_vec(&common::conversation(4, 5)).unwrap(),
        "application/json",
    );
    let config = ProcessorConfig {
        output_bucket: "docs".to_string(),
        ..ProcessorConfig::default()
    };
    let client = Arc::new(ModelClientBuilder::new(endpoint).build());
    let orchestrator = PipelineOrchestrator::new(client, store.clone());
    (Processor::new(config, orchestrator, reporter), store)
}

fn event() -> serde_json::Value {
    json!({
        "execution_id": "exec-1",
        "transcription_s3_uri": "s3://media/transcripts/exec-1.json",
        "video_s3_uri": "s3://media/videos/exec-1.mp4",
        "video_metadata": { "duration": 95.5 }
    })
}

struct BrokenReporter;

#[async_trait::async_trait]
impl ProgressReporter for BrokenReporter {
    async fn report(&self, _execution_id: &str, _update: ProgressUpdate) -> Result<()> {
        Err(Error::storage_with_context("tracking table unavailable", Default::default()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_successful_job_returns_summary_and_completes_tracking() {
    let reporter = Arc::new(InMemoryReporter::new());
    let (processor, store) = processor(StageEndpoint::happy(), reporter.clone());

    let response = processor.handle(&event()).await;

    assert_eq!(response.status_code, 200, "body: {}", response.body);
    assert!(response.is_success());
    assert_eq!(response.body["markdown_uri"], "s3://docs/exec-1/document.md");
    assert_eq!(response.body["document_uri"], "s3://docs/exec-1/document.html");
    assert_eq!(response.body["stages_completed"], 6);
    assert_eq!(response.body["chunks_processed"], 1);
    assert!(response.body["tokens_used"]["total"].as_u64().unwrap() > 0);
    assert!(response.body["duration_seconds"].is_number());
    assert_eq!(store.keys("docs").len(), 2);

    let updates = reporter.updates_for("exec-1");
    assert_eq!(updates[0].status, ProgressStatus::Processing);
    assert_eq!(updates[0].data["processor_version"], PROCESSOR_VERSION);
    assert!(updates.iter().any(|u| u.stage.as_deref() == Some("stage-3/chunk-0")));
    let last = updates.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Completed);
    assert_eq!(last.data["markdown_uri"], "s3://docs/exec-1/document.md");

    let serialized = serde_json::to_value(&response).unwrap();
    assert_eq!(serialized["statusCode"], 200);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_event_is_rejected_without_running() {
    let endpoint = StageEndpoint::happy();
    let reporter = Arc::new(InMemoryReporter::new());
    let (processor, _) = processor(endpoint.clone(), reporter.clone());

    let response = processor
        .handle(&json!({ "execution_id": "exec-1", "video_uri": "s3://media/v.mp4" }))
        .await;

    assert_eq!(response.status_code, 400);
    assert_eq!(response.body["error"], "ConfigurationError");
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .contains("transcription_uri"));
    assert_eq!(endpoint.calls(), 0);
    assert!(reporter.updates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_returns_500_with_stage_details() {
    let endpoint = StageEndpoint::new(|stage, _, _| match stage {
        StageId::MapSolutions => Err(Error::provider(ProviderErrorKind::AccessDenied, "model not enabled")),
        other => Ok(common::canned(other).to_string()),
    });
    let reporter = Arc::new(InMemoryReporter::new());
    let (processor, store) = processor(endpoint, reporter.clone());

    let response = processor.handle(&event()).await;

    assert_eq!(response.status_code, 500);
    assert_eq!(response.body["error"], "ProcessingError");
    assert_eq!(response.body["execution_id"], "exec-1");
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .starts_with("Processing error:"));
    let stages = response.body["stages"].as_array().unwrap();
    assert_eq!(stages.len(), 5);
    assert_eq!(stages[2]["status"], "failed");
    assert!(store.keys("docs").is_empty());

    assert_eq!(reporter.last_status("exec-1"), Some(ProgressStatus::Failed));
    let last = reporter.updates_for("exec-1").pop().unwrap();
    assert!(last.error.as_deref().unwrap().starts_with("Processing error:"));
}

#[tokio::test(start_paused = true)]
async fn test_tracking_failures_do_not_fail_the_job() {
    let (processor, _) = processor(StageEndpoint::happy(), Arc::new(BrokenReporter));
    let response = processor.handle(&event()).await;
    assert_eq!(response.status_code, 200);
}
