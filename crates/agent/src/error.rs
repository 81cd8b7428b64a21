//! Pipeline error taxonomy.

use crate::machine::{Event, Stage};
use cityhub_core::AppError;
use thiserror::Error;

/// Why a pipeline run ended in `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Routing failed: {0}")]
    Routing(String),

    #[error("Evidence source failed: {0}")]
    EvidenceSource(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("Step budget of {budget} exhausted before a validated answer was produced")]
    BudgetExceeded { budget: u32 },

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Invalid transition: {event:?} is not accepted in stage {stage:?}")]
    InvalidTransition { stage: Stage, event: Event },
}

impl PipelineError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Routing(_) => "routing",
            Self::EvidenceSource(_) => "evidence_source",
            Self::Validation(_) => "validation",
            Self::Generation(_) => "generation",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::InvalidQuestion(_) => "invalid_question",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// True when a collaborator (model, index, search backend) is broken,
    /// as opposed to the pipeline having tried and failed to validate.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            Self::Routing(_) | Self::EvidenceSource(_) | Self::Validation(_) | Self::Generation(_)
        )
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err.to_string())
    }
}
