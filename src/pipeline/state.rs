use super::stages::StageId;
use serde::Serialize;
use std::fmt;

/// Where a pipeline run is.
///
/// ```text
/// Loading -> Chunking -> Stage(chunk, 1..5) -> [Merging] -> OutputGeneration -> Done
///                     \______________ any step ______________/-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Loading,
    Chunking,
    Stage {
        stage: StageId,
        chunk_id: Option<usize>,
    },
    Merging,
    OutputGeneration,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Whether `next` may follow `self`.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Loading, Chunking) => true,
            (Chunking, Stage { .. }) => true,
            (Stage { .. }, Stage { .. } | Merging | OutputGeneration) => true,
            (Merging, Stage { stage, .. }) => *stage == StageId::Write,
            (OutputGeneration, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Loading => write!(f, "loading"),
            PipelineState::Chunking => write!(f, "chunking"),
            PipelineState::Stage {
                stage,
                chunk_id: Some(id),
            } => write!(f, "{}/chunk-{}", stage, id),
            PipelineState::Stage { stage, chunk_id: None } => write!(f, "{}", stage),
            PipelineState::Merging => write!(f, "merging"),
            PipelineState::OutputGeneration => write!(f, "output_generation"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(stage: StageId, chunk_id: Option<usize>) -> PipelineState {
        PipelineState::Stage { stage, chunk_id }
    }

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            PipelineState::Loading,
            PipelineState::Chunking,
            stage(StageId::Clean, Some(1)),
            stage(StageId::Outline, Some(1)),
            stage(StageId::Clean, Some(2)),
            stage(StageId::Outline, Some(2)),
            PipelineState::Merging,
            stage(StageId::Write, None),
            PipelineState::OutputGeneration,
            PipelineState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_is_absorbing_and_reachable() {
        assert!(PipelineState::Loading.can_transition_to(&PipelineState::Failed));
        assert!(stage(StageId::Extract, Some(1)).can_transition_to(&PipelineState::Failed));
        assert!(!PipelineState::Failed.can_transition_to(&PipelineState::Loading));
        assert!(!PipelineState::Done.can_transition_to(&PipelineState::Failed));
        assert!(!PipelineState::Merging.can_transition_to(&stage(StageId::Extract, None)));
        assert!(PipelineState::Failed.is_terminal());
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(stage(StageId::Extract, Some(2)).to_string(), "stage-2/chunk-2");
        assert_eq!(stage(StageId::Write, None).to_string(), "stage-5");
        assert_eq!(PipelineState::OutputGeneration.to_string(), "output_generation");
    }
}
