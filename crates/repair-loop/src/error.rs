//! Failure taxonomy for stage attempts and sessions.
//!
//! Every way a stage attempt can fail is represented here. The orchestrator
//! queries `disposition()` to decide between rollback, local retry, and
//! terminal failure without string matching.
//!
//! | Class                 | Disposition |
//! |-----------------------|-------------|
//! | StageExhaustion       | local retry, then terminal |
//! | GateRejection         | rollback when the stage has a backward edge, else local retry |
//! | FormatViolation       | local retry (production defect, not a design flaw) |
//! | RestartBudgetExceeded | terminal |
//! | ExternalCapability    | local retry, then terminal |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rollback::RollbackEdge;
use crate::stage::Stage;

/// Classified failure of one stage attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "class")]
pub enum FailureClass {
    /// The stage consumed its turn budget without meeting its exit condition.
    #[error("stage {stage} exhausted its budget after {turns} turns without meeting its exit condition")]
    StageExhaustion { stage: Stage, turns: u32 },

    /// The quality gate (or, for validation, direct execution) said no.
    #[error("quality gate rejected {stage}: {reason}")]
    GateRejection { stage: Stage, reason: String },

    /// The implementation artifact is not a structurally complete code unit.
    #[error("implementation artifact is structurally invalid: {reason}")]
    FormatViolation { reason: String },

    /// A backward edge was triggered more times than its configured cap.
    #[error("rollback budget exceeded on the {edge} edge after {count} rollbacks")]
    RestartBudgetExceeded { edge: RollbackEdge, count: u32 },

    /// An external collaborator call errored or timed out.
    #[error("external capability failed during {stage}: {detail}")]
    ExternalCapability { stage: Stage, detail: String },
}

/// What the orchestrator does about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Unwind along the stage's backward edge.
    Rollback(RollbackEdge),
    /// Re-run the same stage, bounded by its local retry budget.
    RetryInPlace,
    /// End the session as a failure.
    Terminal,
}

impl FailureClass {
    /// The stage the failure occurred at, when it is stage-scoped.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageExhaustion { stage, .. }
            | Self::GateRejection { stage, .. }
            | Self::ExternalCapability { stage, .. } => Some(*stage),
            Self::FormatViolation { .. } => Some(Stage::Implementation),
            Self::RestartBudgetExceeded { .. } => None,
        }
    }

    /// Resolve the failure to a disposition for the stage it occurred at.
    ///
    /// Only gate rejections at rollback-eligible stages unwind prior work;
    /// everything else is local. Budget enforcement happens at the caller —
    /// this is pure classification.
    pub fn disposition(&self, at: Stage) -> FailureDisposition {
        match self {
            Self::GateRejection { .. } => match RollbackEdge::from_stage(at) {
                Some(edge) => FailureDisposition::Rollback(edge),
                None => FailureDisposition::RetryInPlace,
            },
            Self::StageExhaustion { .. }
            | Self::FormatViolation { .. }
            | Self::ExternalCapability { .. } => FailureDisposition::RetryInPlace,
            Self::RestartBudgetExceeded { .. } => FailureDisposition::Terminal,
        }
    }
}
