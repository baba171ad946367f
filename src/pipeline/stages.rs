use crate::storage::ObjectLocation;
use crate::tokens::TokenUsage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// The six fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageId {
    Clean,
    Extract,
    MapSolutions,
    Outline,
    Write,
    Output,
}

impl StageId {
    pub const ALL: [StageId; 6] = [
        StageId::Clean,
        StageId::Extract,
        StageId::MapSolutions,
        StageId::Outline,
        StageId::Write,
        StageId::Output,
    ];

    pub fn number(&self) -> u8 {
        match self {
            StageId::Clean => 1,
            StageId::Extract => 2,
            StageId::MapSolutions => 3,
            StageId::Outline => 4,
            StageId::Write => 5,
            StageId::Output => 6,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.number() == n)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageId::Clean => "Transcription Cleaning",
            StageId::Extract => "Technical Content Extraction",
            StageId::MapSolutions => "Solution Mapping",
            StageId::Outline => "Document Structuring",
            StageId::Write => "Content Writing",
            StageId::Output => "Output Generation",
        }
    }

    /// The stage whose output this stage consumes.
    pub fn upstream(&self) -> Option<StageId> {
        Self::from_number(self.number().checked_sub(1)?)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.number())
    }
}

impl Serialize for StageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for StageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = u8::deserialize(deserializer)?;
        Self::from_number(n).ok_or_else(|| serde::de::Error::custom(format!("unknown stage {n}")))
    }
}

/// The two artifacts written by the output stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLocations {
    pub markdown: ObjectLocation,
    pub document: ObjectLocation,
}

/// What a stage produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StageOutput {
    Text(String),
    Json(Value),
    Artifacts(ArtifactLocations),
}

impl StageOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StageOutput::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            StageOutput::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_artifacts(&self) -> Option<&ArtifactLocations> {
        match self {
            StageOutput::Artifacts(locations) => Some(locations),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// One stage execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub stage_id: StageId,
    pub stage_name: &'static str,
    pub output: Option<StageOutput>,
    pub tokens_used: TokenUsage,
    #[serde(rename = "duration_seconds", serialize_with = "as_secs")]
    pub duration: Duration,
    pub status: StageStatus,
    pub error: Option<String>,
    /// Chunk the stage ran on; `None` for the merged writing stage and the output stage.
    pub chunk_id: Option<usize>,
}

impl StageResult {
    pub fn success(
        stage: StageId,
        chunk_id: Option<usize>,
        output: StageOutput,
        tokens_used: TokenUsage,
        duration: Duration,
    ) -> Self {
        Self {
            stage_id: stage,
            stage_name: stage.name(),
            output: Some(output),
            tokens_used,
            duration,
            status: StageStatus::Success,
            error: None,
            chunk_id,
        }
    }

    pub fn failed(
        stage: StageId,
        chunk_id: Option<usize>,
        error: impl Into<String>,
        tokens_used: TokenUsage,
        duration: Duration,
    ) -> Self {
        Self {
            stage_id: stage,
            stage_name: stage.name(),
            output: None,
            tokens_used,
            duration,
            status: StageStatus::Failed,
            error: Some(error.into()),
            chunk_id,
        }
    }

    /// A stage that never ran because its input is missing.
    pub fn blocked(stage: StageId, chunk_id: Option<usize>, reason: impl Into<String>) -> Self {
        Self::failed(stage, chunk_id, reason, TokenUsage::default(), Duration::ZERO)
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success && self.output.is_some()
    }

    pub fn text(&self) -> Option<&str> {
        self.output.as_ref().and_then(StageOutput::as_text)
    }

    pub fn json(&self) -> Option<&Value> {
        self.output.as_ref().and_then(StageOutput::as_json)
    }
}

/// Accepts a list of strings; non-string entries are kept as compact JSON.
fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    };
    Ok(items
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

/// Accepts a string or any other JSON value, rendered compactly.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default, deserialize_with = "lenient_string")]
    pub error_code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub root_cause: String,
}

/// Stage 2 payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalContent {
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub solutions: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub risks: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub business_rules: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub configurations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemSolution {
    #[serde(default, deserialize_with = "lenient_string")]
    pub problem: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub root_cause: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub solution_steps: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub commands: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub outcome: String,
}

/// Stage 3 payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionMap {
    #[serde(default)]
    pub problem_solution_map: Vec<ProblemSolution>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub preventive_measures: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub debugging_steps: Vec<String>,
}
