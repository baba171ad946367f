//! Progress reporting to the tracking store.
//!
//! The tracking record belongs to the caller; the pipeline only pushes
//! [`ProgressUpdate`]s keyed by execution id. Reporter failures never fail a
//! run: [`report_best_effort`] logs them and moves on.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    Processing,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Processing => "PROCESSING",
            ProgressStatus::Completed => "COMPLETED",
            ProgressStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub status: ProgressStatus,
    /// Pipeline step this update refers to, e.g. `"stage_3"` or `"merge"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(status: ProgressStatus) -> Self {
        Self {
            status,
            stage: None,
            data: serde_json::Value::Null,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn processing() -> Self {
        Self::new(ProgressStatus::Processing)
    }

    pub fn completed(data: serde_json::Value) -> Self {
        Self::new(ProgressStatus::Completed).with_data(data)
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::new(ProgressStatus::Failed).with_error(error)
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, execution_id: &str, update: ProgressUpdate) -> Result<()>;
}

/// Reporter used when no tracking store is configured.
pub struct NoopReporter;

#[async_trait]
impl ProgressReporter for NoopReporter {
    async fn report(&self, _: &str, _: ProgressUpdate) -> Result<()> {
        Ok(())
    }
}

pub fn noop_reporter() -> Arc<dyn ProgressReporter> {
    Arc::new(NoopReporter)
}

/// Keeps every update in memory, in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryReporter {
    updates: Mutex<Vec<(String, ProgressUpdate)>>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(String, ProgressUpdate)> {
        self.updates.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Updates for one execution.
    pub fn updates_for(&self, execution_id: &str) -> Vec<ProgressUpdate> {
        self.updates()
            .into_iter()
            .filter(|(id, _)| id == execution_id)
            .map(|(_, u)| u)
            .collect()
    }

    pub fn last_status(&self, execution_id: &str) -> Option<ProgressStatus> {
        self.updates_for(execution_id).last().map(|u| u.status)
    }
}

#[async_trait]
impl ProgressReporter for InMemoryReporter {
    async fn report(&self, execution_id: &str, update: ProgressUpdate) -> Result<()> {
        self.updates
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((execution_id.to_string(), update));
        Ok(())
    }
}

/// Deliver an update, logging instead of propagating a reporter failure.
pub async fn report_best_effort(
    reporter: &dyn ProgressReporter,
    execution_id: &str,
    update: ProgressUpdate,
) {
    let status = update.status.as_str();
    match reporter.report(execution_id, update).await {
        Ok(()) => debug!(execution_id, status, "Progress reported"),
        Err(e) => warn!(execution_id, status, error = %e, "Failed to report progress"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct Broken;

    #[async_trait]
    impl ProgressReporter for Broken {
        async fn report(&self, _: &str, _: ProgressUpdate) -> Result<()> {
            Err(Error::storage_with_context("table missing", Default::default()))
        }
    }

    #[tokio::test]
    async fn test_in_memory_reporter_keeps_order() {
        let reporter = InMemoryReporter::new();
        report_best_effort(&reporter, "e1", ProgressUpdate::processing().with_stage("stage_2")).await;
        report_best_effort(&reporter, "e2", ProgressUpdate::failed("boom")).await;
        report_best_effort(&reporter, "e1", ProgressUpdate::completed(serde_json::json!({"chunks": 1}))).await;

        let e1 = reporter.updates_for("e1");
        assert_eq!(e1.len(), 2);
        assert_eq!(e1[0].stage.as_deref(), Some("stage_2"));
        assert_eq!(reporter.last_status("e1"), Some(ProgressStatus::Completed));
        assert_eq!(reporter.last_status("e2"), Some(ProgressStatus::Failed));
    }

    #[tokio::test]
    async fn test_reporter_failure_is_swallowed() {
        report_best_effort(&Broken, "e1", ProgressUpdate::processing()).await;
    }

    #[test]
    fn test_update_serializes_status_names() {
        let json = serde_json::to_value(ProgressUpdate::failed("x")).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["error"], "x");
        assert!(json.get("data").is_none());
    }
}
