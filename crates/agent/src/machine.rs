//! The pipeline as an explicit finite-state machine.
//!
//! `transition` is pure: it knows nothing about collaborators or budgets.
//! The orchestrator produces events by running the active stage and feeds
//! them back here.

use crate::state::WebSearchFlag;
use crate::verdict::{Adequacy, Grounding, Route};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Start,
    RetrieveLocal,
    FilterRelevance,
    WebSearch,
    Generate,
    ValidateGrounding,
    ValidateAdequacy,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Stages that gather evidence or produce an answer. Only entering one
    /// of these is charged against the step budget; the verdict checks
    /// decide where to go next and are free.
    pub fn consumes_step(self) -> bool {
        matches!(
            self,
            Stage::RetrieveLocal | Stage::FilterRelevance | Stage::WebSearch | Stage::Generate
        )
    }
}

/// Outcome of running one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Routed(Route),
    Retrieved,
    Filtered(WebSearchFlag),
    Searched,
    Generated,
    Grounding(Grounding),
    Adequacy(Adequacy),
    CollaboratorFailed,
}

/// Next stage for `event` in `stage`. Events that do not belong to the
/// current stage lead to `Failed`.
pub fn transition(stage: Stage, event: Event) -> Stage {
    use Event as E;
    use Stage as S;

    match (stage, event) {
        (S::Start, E::Routed(Route::LocalIndex)) => S::RetrieveLocal,
        (S::Start, E::Routed(Route::WebSearch)) => S::WebSearch,
        (S::RetrieveLocal, E::Retrieved) => S::FilterRelevance,
        (S::FilterRelevance, E::Filtered(WebSearchFlag::Yes)) => S::WebSearch,
        (S::FilterRelevance, E::Filtered(WebSearchFlag::No)) => S::Generate,
        (S::WebSearch, E::Searched) => S::Generate,
        (S::Generate, E::Generated) => S::ValidateGrounding,
        (S::ValidateGrounding, E::Grounding(Grounding::NotGrounded)) => S::Generate,
        (S::ValidateGrounding, E::Grounding(Grounding::Grounded)) => S::ValidateAdequacy,
        (S::ValidateAdequacy, E::Adequacy(Adequacy::Adequate)) => S::Done,
        (S::ValidateAdequacy, E::Adequacy(Adequacy::Inadequate)) => S::WebSearch,
        _ => S::Failed,
    }
}
