use super::stages::{StageId, StageResult};
use super::state::PipelineState;
use crate::storage::ObjectLocation;
use crate::tokens::TokenUsage;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Outcome of one `generate` call. Returned on success and on failure alike.
///
/// A failed run never carries content or artifact locations; its stage
/// results are kept for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub execution_id: String,
    pub status: RunStatus,
    pub final_content: Option<String>,
    pub markdown_location: Option<ObjectLocation>,
    pub document_location: Option<ObjectLocation>,
    pub total_usage: TokenUsage,
    pub cost_usd: f64,
    #[serde(rename = "duration_seconds", serialize_with = "as_secs")]
    pub duration: Duration,
    pub stages: Vec<StageResult>,
    pub chunks_processed: usize,
    pub final_state: PipelineState,
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Results of one stage across all chunks, in execution order.
    pub fn stage_results(&self, stage: StageId) -> impl Iterator<Item = &StageResult> {
        self.stages.iter().filter(move |s| s.stage_id == stage)
    }

    pub fn failed_stages(&self) -> impl Iterator<Item = &StageResult> {
        self.stages.iter().filter(|s| !s.is_success())
    }

    /// Tracking payload: artifact URIs, usage, cost and timing.
    pub fn summary(&self) -> Value {
        json!({
            "execution_id": self.execution_id,
            "status": self.status,
            "markdown_uri": self.markdown_location.as_ref().map(ObjectLocation::uri),
            "document_uri": self.document_location.as_ref().map(ObjectLocation::uri),
            "tokens_used": {
                "input": self.total_usage.input_tokens,
                "output": self.total_usage.output_tokens,
                "total": self.total_usage.total(),
            },
            "cost_usd": self.cost_usd,
            "duration_seconds": self.duration.as_secs_f64(),
            "chunks_processed": self.chunks_processed,
            "stage_count": self.stages.len(),
            "error": self.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::StageOutput;

    fn result() -> PipelineResult {
        PipelineResult {
            execution_id: "e1".into(),
            status: RunStatus::Success,
            final_content: Some("# Doc".into()),
            markdown_location: Some(ObjectLocation::new("out", "e1/document.md")),
            document_location: Some(ObjectLocation::new("out", "e1/document.html")),
            total_usage: TokenUsage::new(100, 50),
            cost_usd: 0.001,
            duration: Duration::from_secs(3),
            stages: vec![
                StageResult::success(StageId::Clean, Some(1), StageOutput::Text("t".into()), TokenUsage::default(), Duration::ZERO),
                StageResult::blocked(StageId::Extract, Some(1), "x"),
            ],
            chunks_processed: 1,
            final_state: PipelineState::Done,
            error: None,
        }
    }

    #[test]
    fn test_summary_fields() {
        let summary = result().summary();
        assert_eq!(summary["markdown_uri"], "s3://out/e1/document.md");
        assert_eq!(summary["tokens_used"]["total"], 150);
        assert_eq!(summary["status"], "success");
        assert_eq!(summary["stage_count"], 2);
    }

    #[test]
    fn test_stage_filters() {
        let r = result();
        assert_eq!(r.stage_results(StageId::Clean).count(), 1);
        assert_eq!(r.failed_stages().count(), 1);
        assert!(r.is_success());
    }
}
