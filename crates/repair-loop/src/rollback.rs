//! Rollback policy — the two backward edges and their context enrichment.
//!
//! Only stages whose artifacts have already been consumed by accepted
//! downstream work can invalidate that work: a stress-testing failure
//! invalidates the agreed blueprint, a validation failure invalidates the
//! whole analysis. Every other failure is local to its stage.
//!
//! Planning is pure: given the failing attempt's data it returns the target
//! stage and the failure note to carry, and mutates nothing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::StageArtifact;
use crate::capability::ExecutionReport;
use crate::context::{CarriedContext, FailureNote};
use crate::gate::QualityVerdict;
use crate::stage::Stage;

/// One of the two declared backward edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackEdge {
    /// Stress-testing failure invalidates the agreed design.
    StressToBlueprint,
    /// Validation failure restarts root-cause analysis.
    ValidationToDiagnosis,
}

impl RollbackEdge {
    /// The edge triggered by a failure at `stage`, if any.
    pub fn from_stage(stage: Stage) -> Option<Self> {
        match stage {
            Stage::StressTesting => Some(Self::StressToBlueprint),
            Stage::Validation => Some(Self::ValidationToDiagnosis),
            _ => None,
        }
    }

    pub fn source(self) -> Stage {
        match self {
            Self::StressToBlueprint => Stage::StressTesting,
            Self::ValidationToDiagnosis => Stage::Validation,
        }
    }

    pub fn target(self) -> Stage {
        match self {
            Self::StressToBlueprint => Stage::BlueprintDesign,
            Self::ValidationToDiagnosis => Stage::Diagnosis,
        }
    }
}

impl fmt::Display for RollbackEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.source(), self.target())
    }
}

/// Summarize which probes broke the blueprint and why, so the redesign is
/// informed rather than blind.
pub fn stress_failure_note(
    artifact: &StageArtifact,
    verdict: &QualityVerdict,
    attempt: u32,
) -> FailureNote {
    let narrative = match artifact {
        StageArtifact::StressReport(report) => {
            let failing: Vec<String> = report
                .probes
                .iter()
                .filter(|p| !p.survived)
                .map(|p| format!("- {}: {}", p.description, p.expectation))
                .collect();
            if failing.is_empty() {
                format!("stress report judged invalid: {}", verdict.rationale)
            } else {
                format!(
                    "the agreed blueprint breaks under these edge cases:\n{}",
                    failing.join("\n")
                )
            }
        }
        other => format!(
            "stress testing failed ({}): {}",
            other.stage(),
            verdict.rationale
        ),
    };
    FailureNote {
        stage: Stage::StressTesting,
        attempt,
        narrative,
    }
}

/// Carry the full chain of the failed implementation attempt — blueprint,
/// code, and error signal — never a truncated subset.
pub fn validation_failure_note(
    context: &CarriedContext,
    report: &ExecutionReport,
    attempt: u32,
) -> FailureNote {
    let narrative = format!(
        "implementation failed validation.\n\
         ## Blueprint that was implemented\n{}\n\
         ## Code that failed\n{}\n\
         ## Error signal\n{}",
        context.blueprint().unwrap_or("(no accepted blueprint)"),
        context.code().unwrap_or("(no accepted code)"),
        report.failure_digest()
    );
    FailureNote {
        stage: Stage::Validation,
        attempt,
        narrative,
    }
}

/// Plan the rollback for a failed attempt at `stage`.
///
/// Returns the target stage and the failure note to append to the carried
/// context, or `None` when the stage has no backward edge.
pub fn plan_rollback(
    stage: Stage,
    artifact: &StageArtifact,
    verdict: &QualityVerdict,
    context: &CarriedContext,
    attempt: u32,
) -> Option<(Stage, FailureNote)> {
    let edge = RollbackEdge::from_stage(stage)?;
    let note = match (edge, artifact) {
        (RollbackEdge::StressToBlueprint, _) => stress_failure_note(artifact, verdict, attempt),
        (RollbackEdge::ValidationToDiagnosis, StageArtifact::Validation(report)) => {
            validation_failure_note(context, report, attempt)
        }
        (RollbackEdge::ValidationToDiagnosis, other) => FailureNote {
            stage: Stage::Validation,
            attempt,
            narrative: format!("validation failed ({}): {}", other.stage(), verdict.rationale),
        },
    };
    Some((edge.target(), note))
}
