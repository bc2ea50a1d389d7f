//! Session-scoped data: the immutable problem, the carried context, and the
//! mutable session state owned by the orchestrator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::artifact::StageArtifact;
use crate::error::FailureClass;
use crate::ledger::{ExecutionSummary, Ledger};
use crate::rollback::RollbackEdge;
use crate::stage::{is_legal_transition, IllegalTransition, Stage};

/// One assertable test condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub assertion: String,
}

impl TestCase {
    pub fn new(assertion: impl Into<String>) -> Self {
        Self {
            assertion: assertion.into(),
        }
    }
}

/// The immutable input of one debug session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSpec {
    pub description: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_logs: Option<String>,
}

impl ProblemSpec {
    pub fn new(description: impl Into<String>, test_cases: Vec<TestCase>) -> Self {
        Self {
            description: description.into(),
            test_cases,
            current_code: None,
            error_logs: None,
        }
    }

    pub fn with_current_code(mut self, code: impl Into<String>) -> Self {
        self.current_code = Some(code.into());
        self
    }

    pub fn with_error_logs(mut self, logs: impl Into<String>) -> Self {
        self.error_logs = Some(logs.into());
        self
    }
}

/// A failure narrative attached to the carried context, traceable to the
/// attempt that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureNote {
    pub stage: Stage,
    pub attempt: u32,
    pub narrative: String,
}

/// Accumulated artifacts and failure narratives, passed forward and backward
/// between stages. Grows monotonically within a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarriedContext {
    accepted: BTreeMap<Stage, StageArtifact>,
    failure_notes: Vec<FailureNote>,
}

impl CarriedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest accepted artifact for its stage.
    pub fn accept(&mut self, artifact: StageArtifact) {
        self.accepted.insert(artifact.stage(), artifact);
    }

    pub fn accepted(&self, stage: Stage) -> Option<&StageArtifact> {
        self.accepted.get(&stage)
    }

    pub fn diagnosis(&self) -> Option<&str> {
        match self.accepted.get(&Stage::Diagnosis) {
            Some(StageArtifact::Diagnosis(text)) => Some(text),
            _ => None,
        }
    }

    pub fn blueprint(&self) -> Option<&str> {
        match self.accepted.get(&Stage::BlueprintDesign) {
            Some(StageArtifact::Blueprint(text)) => Some(text),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self.accepted.get(&Stage::Implementation) {
            Some(StageArtifact::Code(code)) => Some(code),
            _ => None,
        }
    }

    /// Append a failure narrative. Notes are never removed.
    pub fn note_failure(&mut self, note: FailureNote) {
        debug!(stage = %note.stage, attempt = note.attempt, "failure note carried");
        self.failure_notes.push(note);
    }

    pub fn failure_notes(&self) -> &[FailureNote] {
        &self.failure_notes
    }

    /// Assemble the briefing for the stage about to run: the problem, the
    /// accepted artifacts so far, and every prior failure narrative. A stage
    /// re-entered after a rollback therefore restarts with strictly more
    /// information than its first run.
    pub fn briefing_for(&self, stage: Stage, problem: &ProblemSpec) -> String {
        let mut sections = vec![format!("# Problem\n{}", problem.description)];

        if !problem.test_cases.is_empty() {
            let cases: Vec<String> = problem
                .test_cases
                .iter()
                .map(|c| format!("- {}", c.assertion))
                .collect();
            sections.push(format!("# Test cases\n{}", cases.join("\n")));
        }
        if let Some(code) = &problem.current_code {
            sections.push(format!("# Current (failing) code\n{}", code));
        }
        if let Some(logs) = &problem.error_logs {
            sections.push(format!("# Error log\n{}", logs));
        }

        for (artifact_stage, artifact) in &self.accepted {
            // The running stage's own prior artifact is superseded, not input.
            if *artifact_stage == stage {
                continue;
            }
            sections.push(format!(
                "# Accepted {} artifact\n{}",
                artifact_stage,
                artifact.rendered()
            ));
        }

        if !self.failure_notes.is_empty() {
            let notes: Vec<String> = self
                .failure_notes
                .iter()
                .map(|n| {
                    format!(
                        "## {} attempt {}\n{}",
                        n.stage, n.attempt, n.narrative
                    )
                })
                .collect();
            sections.push(format!("# Prior failures\n{}", notes.join("\n")));
        }

        sections.join("\n\n")
    }
}

/// Terminal result of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SessionOutcome {
    Success,
    Failure { cause: FailureClass },
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Success => "success".to_string(),
            Self::Failure { cause } => format!("failure: {}", cause),
        }
    }
}

/// The mutable root object of one debug run.
///
/// Owned exclusively by the orchestrator; every stage change goes through
/// [`SessionState::move_to`], which enforces the transition graph and keeps
/// the ledger in sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    current: Stage,
    pub ledger: Ledger,
    pub context: CarriedContext,
    rollbacks_to_blueprint: u32,
    rollbacks_to_diagnosis: u32,
    outcome: Option<SessionOutcome>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            current: Stage::Diagnosis,
            ledger: Ledger::new(),
            context: CarriedContext::new(),
            rollbacks_to_blueprint: 0,
            rollbacks_to_diagnosis: 0,
            outcome: None,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Move to another stage along a declared edge.
    pub fn move_to(&mut self, to: Stage, reason: &str) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }
        debug!(from = %self.current, to = %to, reason, "stage transition");
        self.ledger.record_transition(self.current, to, reason);
        self.current = to;
        Ok(())
    }

    /// Count a rollback along `edge`; returns the new total for that edge.
    pub fn count_rollback(&mut self, edge: RollbackEdge) -> u32 {
        let counter = match edge {
            RollbackEdge::StressToBlueprint => &mut self.rollbacks_to_blueprint,
            RollbackEdge::ValidationToDiagnosis => &mut self.rollbacks_to_diagnosis,
        };
        *counter += 1;
        *counter
    }

    pub fn rollbacks_along(&self, edge: RollbackEdge) -> u32 {
        match edge {
            RollbackEdge::StressToBlueprint => self.rollbacks_to_blueprint,
            RollbackEdge::ValidationToDiagnosis => self.rollbacks_to_diagnosis,
        }
    }

    /// Seal the session with its terminal outcome.
    pub fn finish(&mut self, outcome: SessionOutcome) {
        debug_assert!(self.outcome.is_none(), "session finished twice");
        self.outcome = Some(outcome);
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Observability projection of the ledger.
    pub fn execution_summary(&self) -> ExecutionSummary {
        let outcome = self
            .outcome
            .as_ref()
            .map(|o| o.describe())
            .unwrap_or_else(|| "running".to_string());
        self.ledger.summary(&outcome)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
