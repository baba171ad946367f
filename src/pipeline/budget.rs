use super::stages::StageId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 64_000;

/// Output-token ceiling per model stage, as fractions of one maximum.
///
/// | Stage | Share |
/// |-------|-------|
/// | 2 extraction | 25% |
/// | 3 solution mapping | 50% |
/// | 4 outline | 25% |
/// | 5 writing | 100% |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBudget {
    pub max_output_tokens: u32,
    pub extraction: u32,
    pub solution_mapping: u32,
    pub outline: u32,
    pub writing: u32,
}

impl Default for StageBudget {
    fn default() -> Self {
        Self::from_max_output(DEFAULT_MAX_OUTPUT_TOKENS)
    }
}

fn share(max: u32, fraction: f64) -> u32 {
    (max as f64 * fraction).round() as u32
}

impl StageBudget {
    pub fn from_max_output(max_output_tokens: u32) -> Self {
        Self {
            max_output_tokens,
            extraction: share(max_output_tokens, 0.25),
            solution_mapping: share(max_output_tokens, 0.50),
            outline: share(max_output_tokens, 0.25),
            writing: max_output_tokens,
        }
    }

    /// Budget for a model stage; `None` for the stages that make no model call.
    pub fn for_stage(&self, stage: StageId) -> Option<u32> {
        match stage {
            StageId::Clean | StageId::Output => None,
            StageId::Extract => Some(self.extraction),
            StageId::MapSolutions => Some(self.solution_mapping),
            StageId::Outline => Some(self.outline),
            StageId::Write => Some(self.writing),
        }
    }
}
