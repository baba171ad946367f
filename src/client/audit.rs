//! Per-call audit records of the exact request/response pairs sent to the model.
//!
//! Writing is best effort: an unwritable directory is logged and otherwise
//! ignored, never failing the model call it describes.

use crate::tokens::TokenUsage;
use crate::transport::ModelRequest;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
pub struct AuditRecord<'a> {
    pub sequence: u32,
    pub stage: &'a str,
    pub timestamp: DateTime<Utc>,
    pub model: &'a str,
    pub system_prompt: Option<&'a str>,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Directory of numbered JSON files, one per model call: `{seq:03}-{stage}.json`.
#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    seq: AtomicU32,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU32::new(0),
        }
    }

    /// Log under `root/<execution_id>`, numbering from 001 again.
    pub fn for_execution(root: &Path, execution_id: &str) -> Self {
        Self::new(root.join(Self::sanitize(execution_id)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn sanitize(name: &str) -> String {
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    fn file_name(seq: u32, stage: &str) -> String {
        format!("{:03}-{}.json", seq, Self::sanitize(stage))
    }

    /// Record one call outcome. Returns the written path when it succeeded.
    pub async fn record(
        &self,
        stage: &str,
        request: &ModelRequest,
        outcome: std::result::Result<&str, &crate::Error>,
        usage: Option<TokenUsage>,
    ) -> Option<PathBuf> {
        let sequence = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let (response, error) = match outcome {
            Ok(text) => (Some(text), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let record = AuditRecord {
            sequence,
            stage,
            timestamp: Utc::now(),
            model: &request.model,
            system_prompt: request.system.as_deref(),
            prompt: &request.prompt,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response,
            error,
            usage,
        };

        let path = self.dir.join(Self::file_name(sequence, stage));
        let body = match serde_json::to_vec_pretty(&record) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, stage, "Failed to serialize audit record");
                return None;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(error = %e, dir = %self.dir.display(), "Failed to create audit directory");
            return None;
        }
        match tokio::fs::write(&path, body).await {
            Ok(()) => {
                debug!(path = %path.display(), "Audit record written");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to write audit record");
                None
            }
        }
    }
}
