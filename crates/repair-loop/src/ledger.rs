//! Append-only history ledger for stage attempts and transitions.
//!
//! Every stage invocation leaves exactly one finalized [`StageAttempt`];
//! every stage change leaves one [`TransitionRecord`]. Records are never
//! edited or removed, which makes the ledger a complete forensic trail and
//! lets [`replay`] re-derive the session outcome offline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::StageArtifact;
use crate::error::FailureClass;
use crate::gate::QualityVerdict;
use crate::stage::{is_legal_transition, Stage};

/// How one stage attempt resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Gate passed — the pipeline moved forward.
    Advanced,
    /// Local failure — the same stage runs again.
    Retried,
    /// Failure triggered a backward edge.
    RolledBack,
    /// Failure ended the session.
    FailedTerminal,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advanced => write!(f, "advanced"),
            Self::Retried => write!(f, "retried"),
            Self::RolledBack => write!(f, "rolled_back"),
            Self::FailedTerminal => write!(f, "failed_terminal"),
        }
    }
}

/// Immutable record of one invocation of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageAttempt {
    pub stage: Stage,
    /// 1-based attempt index for this stage within the session.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// The artifact produced, when the stage got that far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<StageArtifact>,
    /// The gate verdict, for gated stages that produced an artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<QualityVerdict>,
    pub outcome: AttemptOutcome,
    /// The classified failure, for non-advanced attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureClass>,
}

/// Open attempt record, created immediately before a stage runs.
#[derive(Debug)]
pub struct AttemptDraft {
    stage: Stage,
    attempt: u32,
    started_at: DateTime<Utc>,
}

impl AttemptDraft {
    /// Finalize the draft once the stage returned and the gate was consulted.
    pub fn finalize(
        self,
        artifact: Option<StageArtifact>,
        verdict: Option<QualityVerdict>,
        outcome: AttemptOutcome,
        failure: Option<FailureClass>,
    ) -> StageAttempt {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;
        StageAttempt {
            stage: self.stage,
            attempt: self.attempt,
            started_at: self.started_at,
            finished_at,
            duration_ms,
            artifact,
            verdict,
            outcome,
            failure,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// One recorded stage change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Stage,
    pub to: Stage,
    pub at: DateTime<Utc>,
    /// Milliseconds since the ledger was opened.
    pub elapsed_ms: u64,
    pub reason: String,
}

impl TransitionRecord {
    /// Whether this transition travelled a backward edge.
    pub fn is_rollback(&self) -> bool {
        self.from.rollback_target() == Some(self.to)
    }
}

/// Read-only projection of the ledger for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub attempts_per_stage: BTreeMap<Stage, u32>,
    pub total_attempts: u32,
    pub rollbacks_to_blueprint: u32,
    pub rollbacks_to_diagnosis: u32,
    pub total_elapsed_ms: u64,
    pub final_outcome: String,
}

/// The session's append-only record of everything that happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    attempts: Vec<StageAttempt>,
    transitions: Vec<TransitionRecord>,
    opened_at: DateTime<Utc>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
            transitions: Vec::new(),
            opened_at: Utc::now(),
        }
    }

    /// Open a draft for the next attempt at `stage`.
    pub fn begin_attempt(&self, stage: Stage) -> AttemptDraft {
        AttemptDraft {
            stage,
            attempt: self.attempts_for(stage) + 1,
            started_at: Utc::now(),
        }
    }

    /// Append a finalized attempt.
    pub fn record(&mut self, attempt: StageAttempt) {
        self.attempts.push(attempt);
    }

    /// Append a transition record.
    pub fn record_transition(&mut self, from: Stage, to: Stage, reason: &str) {
        let at = Utc::now();
        self.transitions.push(TransitionRecord {
            from,
            to,
            at,
            elapsed_ms: (at - self.opened_at).num_milliseconds().max(0) as u64,
            reason: reason.to_string(),
        });
    }

    pub fn attempts(&self) -> &[StageAttempt] {
        &self.attempts
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Number of recorded attempts for `stage`.
    pub fn attempts_for(&self, stage: Stage) -> u32 {
        self.attempts.iter().filter(|a| a.stage == stage).count() as u32
    }

    pub fn rollback_count(&self) -> u32 {
        self.transitions.iter().filter(|t| t.is_rollback()).count() as u32
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.opened_at).num_milliseconds().max(0) as u64
    }

    /// Whether the recorded transitions form a valid path through the
    /// declared stage graph, starting from the entry stage.
    pub fn is_valid_path(&self) -> bool {
        let mut current = Stage::Diagnosis;
        for t in &self.transitions {
            if t.from != current || !is_legal_transition(t.from, t.to) {
                return false;
            }
            current = t.to;
        }
        true
    }

    /// Build the observability summary. Unvisited stages report zero
    /// attempts rather than being absent.
    pub fn summary(&self, final_outcome: &str) -> ExecutionSummary {
        let mut attempts_per_stage: BTreeMap<Stage, u32> =
            Stage::ALL.iter().map(|&s| (s, 0)).collect();
        for a in &self.attempts {
            *attempts_per_stage.entry(a.stage).or_insert(0u32) += 1;
        }
        let rollbacks_to_blueprint = self
            .transitions
            .iter()
            .filter(|t| t.is_rollback() && t.to == Stage::BlueprintDesign)
            .count() as u32;
        let rollbacks_to_diagnosis = self
            .transitions
            .iter()
            .filter(|t| t.is_rollback() && t.to == Stage::Diagnosis)
            .count() as u32;
        ExecutionSummary {
            attempts_per_stage,
            total_attempts: self.attempts.len() as u32,
            rollbacks_to_blueprint,
            rollbacks_to_diagnosis,
            total_elapsed_ms: self.elapsed_ms(),
            final_outcome: final_outcome.to_string(),
        }
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome reconstructed from a ledger by [`replay`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayedOutcome {
    Success,
    Failure,
}

/// Result of replaying a completed ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Whether the recorded attempts are mutually consistent with the
    /// transition rules.
    pub consistent: bool,
    /// The reconstructed terminal outcome, when the ledger is consistent
    /// and complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReplayedOutcome>,
    /// The stage visited by each attempt, in order.
    pub path: Vec<Stage>,
}

/// Re-derive the session outcome from recorded attempt outcomes alone.
///
/// The transition logic is a pure function of (stage, outcome tag), so a
/// consistent ledger of a completed session always replays to the outcome
/// the orchestrator reported.
pub fn replay(ledger: &Ledger) -> ReplayReport {
    let mut expected = Stage::Diagnosis;
    let mut path = Vec::new();
    let mut outcome = None;

    for (i, attempt) in ledger.attempts().iter().enumerate() {
        let is_last = i + 1 == ledger.attempts().len();
        if attempt.stage != expected || outcome.is_some() {
            return ReplayReport {
                consistent: false,
                outcome: None,
                path,
            };
        }
        path.push(attempt.stage);

        match attempt.outcome {
            AttemptOutcome::Advanced => match attempt.stage.forward_next() {
                Some(next) => expected = next,
                None => outcome = Some(ReplayedOutcome::Success),
            },
            AttemptOutcome::Retried => {}
            AttemptOutcome::RolledBack => match attempt.stage.rollback_target() {
                Some(target) => expected = target,
                None => {
                    return ReplayReport {
                        consistent: false,
                        outcome: None,
                        path,
                    }
                }
            },
            AttemptOutcome::FailedTerminal => {
                if !is_last {
                    return ReplayReport {
                        consistent: false,
                        outcome: None,
                        path,
                    };
                }
                outcome = Some(ReplayedOutcome::Failure);
            }
        }
    }

    ReplayReport {
        consistent: true,
        outcome,
        path,
    }
}
