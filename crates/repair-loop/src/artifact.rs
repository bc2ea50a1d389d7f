//! Stage artifacts — the typed output each stage produces.

use serde::{Deserialize, Serialize};

use crate::capability::ExecutionReport;
use crate::stage::Stage;

/// One adversarial probe against the agreed blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeCaseProbe {
    /// The edge case being probed (input shape, boundary, ordering...).
    pub description: String,
    /// What the reviewer concluded about the blueprint under this probe.
    pub expectation: String,
    /// Whether the blueprint survives the probe.
    pub survived: bool,
}

/// Structured result of the stress-testing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressReport {
    pub probes: Vec<EdgeCaseProbe>,
    /// The reviewer's free-text closing assessment.
    pub summary: String,
}

impl StressReport {
    pub fn all_survived(&self) -> bool {
        self.probes.iter().all(|p| p.survived)
    }

    /// The first probe the blueprint did not survive, if any.
    pub fn first_failing(&self) -> Option<&EdgeCaseProbe> {
        self.probes.iter().find(|p| !p.survived)
    }

    /// Render the report for assessment prompts and carried context.
    pub fn rendered(&self) -> String {
        let mut out = String::new();
        for (i, probe) in self.probes.iter().enumerate() {
            let status = if probe.survived { "survives" } else { "breaks" };
            out.push_str(&format!(
                "probe {}: {} — {} ({})\n",
                i + 1,
                probe.description,
                status,
                probe.expectation
            ));
        }
        out.push_str(&self.summary);
        out
    }
}

/// The artifact produced by one stage attempt, variant by stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum StageArtifact {
    /// Root-cause analysis text.
    Diagnosis(String),
    /// Agreed design blueprint text.
    Blueprint(String),
    /// Edge-case analysis report.
    StressReport(StressReport),
    /// Candidate code unit.
    Code(String),
    /// Execution verdict against the test cases.
    Validation(ExecutionReport),
}

impl StageArtifact {
    /// The stage this artifact variant belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Diagnosis(_) => Stage::Diagnosis,
            Self::Blueprint(_) => Stage::BlueprintDesign,
            Self::StressReport(_) => Stage::StressTesting,
            Self::Code(_) => Stage::Implementation,
            Self::Validation(_) => Stage::Validation,
        }
    }

    /// Text form handed to the quality gate and carried context.
    pub fn rendered(&self) -> String {
        match self {
            Self::Diagnosis(text) | Self::Blueprint(text) | Self::Code(text) => text.clone(),
            Self::StressReport(report) => report.rendered(),
            Self::Validation(report) => report.failure_digest(),
        }
    }

    /// The code text, when this is an implementation artifact.
    pub fn as_code(&self) -> Option<&str> {
        match self {
            Self::Code(code) => Some(code),
            _ => None,
        }
    }
}
