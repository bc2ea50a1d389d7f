//! State-machine orchestrator — drives one debug session end-to-end.
//!
//! The loop is exactly: run the current stage, judge its artifact, then
//! advance, roll back, retry in place, or finish. The orchestrator is the
//! only component that mutates [`SessionState`]; stages and the gate are
//! functions of the inputs they are handed per invocation, so any number of
//! sessions can run concurrently on one orchestrator.

use tracing::{debug, info, warn};

use crate::artifact::StageArtifact;
use crate::capability::Capabilities;
use crate::config::OrchestratorConfig;
use crate::context::{FailureNote, ProblemSpec, SessionOutcome, SessionState};
use crate::error::{FailureClass, FailureDisposition};
use crate::gate::{QualityGate, QualityVerdict};
use crate::ledger::{AttemptDraft, AttemptOutcome, ExecutionSummary};
use crate::rollback::{plan_rollback, RollbackEdge};
use crate::stage::Stage;
use crate::stages::{self, StageContext};

/// Result of one debug session, returned from the sole public entry point.
#[derive(Debug, Clone)]
pub struct DebugOutcome {
    pub success: bool,
    /// The accepted code unit, when implementation got that far.
    pub final_code: Option<String>,
    /// Terminal failure description, on failure.
    pub error: Option<String>,
    /// Observability projection of the ledger.
    pub summary: ExecutionSummary,
    /// Full session snapshot for forensic detail.
    pub session: SessionState,
}

impl DebugOutcome {
    /// Compact status line.
    pub fn summary_line(&self) -> String {
        let status = if self.success { "FIXED" } else { "FAILED" };
        format!(
            "[{}] {} attempts | {} rollbacks | {}ms",
            status,
            self.summary.total_attempts,
            self.summary.rollbacks_to_blueprint + self.summary.rollbacks_to_diagnosis,
            self.summary.total_elapsed_ms,
        )
    }
}

/// The debug-session orchestrator.
///
/// Construct once with the capability bindings, then call
/// [`Orchestrator::debug_problem`] per defect. Sessions share nothing but
/// the (immutable) bindings and configuration.
pub struct Orchestrator {
    capabilities: Capabilities,
    gate: QualityGate,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(capabilities: Capabilities) -> Self {
        Self::with_config(capabilities, OrchestratorConfig::default())
    }

    pub fn with_config(capabilities: Capabilities, config: OrchestratorConfig) -> Self {
        let gate = QualityGate::new(capabilities.assessor.clone());
        Self {
            capabilities,
            gate,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Debug one reported defect to a terminal outcome.
    ///
    /// Resolves only when the session reaches a terminal state or the global
    /// stage-visit ceiling is hit; every failure along the way is recorded in
    /// the ledger rather than raised.
    pub async fn debug_problem(&self, problem: ProblemSpec) -> DebugOutcome {
        let mut session = SessionState::new();
        info!(
            session_id = %session.id,
            cases = problem.test_cases.len(),
            "debug session started"
        );

        // Attempts within the current stage visit; resets on every transition.
        let mut visit_attempts: u32 = 0;

        while !session.is_terminal() {
            let stage = session.current();
            if session.ledger.attempts().len() as u32 >= self.config.max_stage_visits {
                warn!(
                    ceiling = self.config.max_stage_visits,
                    "global stage-visit ceiling hit — session failed"
                );
                session.finish(SessionOutcome::Failure {
                    cause: FailureClass::StageExhaustion {
                        stage,
                        turns: self.config.max_stage_visits,
                    },
                });
                break;
            }

            visit_attempts += 1;
            let draft = session.ledger.begin_attempt(stage);
            debug!(stage = %stage, attempt = draft.attempt(), "stage attempt started");

            let produced = {
                let stage_ctx = StageContext {
                    problem: &problem,
                    carried: &session.context,
                    capabilities: &self.capabilities,
                    gate: &self.gate,
                    config: &self.config,
                };
                run_stage(stage, &stage_ctx).await
            };

            let artifact = match produced {
                Ok(artifact) => artifact,
                Err(failure) => {
                    self.settle_failure(&mut session, &mut visit_attempts, draft, None, None, failure);
                    continue;
                }
            };

            let verdict = match self.judge(stage, &artifact, &session, &problem).await {
                Ok(verdict) => verdict,
                Err(failure) => {
                    self.settle_failure(
                        &mut session,
                        &mut visit_attempts,
                        draft,
                        Some(artifact),
                        None,
                        failure,
                    );
                    continue;
                }
            };

            if verdict.is_pass() {
                visit_attempts = 0;
                session.context.accept(artifact.clone());
                session.ledger.record(draft.finalize(
                    Some(artifact),
                    Some(verdict.clone()),
                    AttemptOutcome::Advanced,
                    None,
                ));
                match stage.forward_next() {
                    Some(next) => {
                        if let Err(err) = session.move_to(next, &verdict.rationale) {
                            warn!(error = %err, "forward transition refused");
                            session.finish(SessionOutcome::Failure {
                                cause: FailureClass::GateRejection {
                                    stage,
                                    reason: err.to_string(),
                                },
                            });
                        }
                    }
                    None => {
                        info!(session_id = %session.id, "validation passed — session succeeded");
                        session.finish(SessionOutcome::Success);
                    }
                }
            } else {
                let failure = match stage {
                    Stage::Implementation => FailureClass::FormatViolation {
                        reason: verdict.rationale.clone(),
                    },
                    _ => FailureClass::GateRejection {
                        stage,
                        reason: verdict.rationale.clone(),
                    },
                };
                self.settle_failure(
                    &mut session,
                    &mut visit_attempts,
                    draft,
                    Some(artifact),
                    Some(verdict),
                    failure,
                );
            }
        }

        assemble_outcome(session)
    }

    /// Judge an artifact: the quality gate for gated stages, the execution
    /// report itself for validation.
    async fn judge(
        &self,
        stage: Stage,
        artifact: &StageArtifact,
        session: &SessionState,
        problem: &ProblemSpec,
    ) -> Result<QualityVerdict, FailureClass> {
        if !stage.has_gate() {
            return Ok(match artifact {
                StageArtifact::Validation(report) if report.passed => {
                    QualityVerdict::pass("all test cases passed").with_confidence(1.0)
                }
                StageArtifact::Validation(report) => {
                    QualityVerdict::fail(report.failure_digest()).with_confidence(1.0)
                }
                _ => QualityVerdict::fail("validation produced no execution report"),
            });
        }

        let context = session.context.briefing_for(stage, problem);
        stages::timebound(
            stage,
            self.config.stage_timeout_ms,
            self.gate.evaluate(stage, artifact, &context),
        )
        .await
    }

    /// Resolve a failed attempt: roll back, retry in place, or finish.
    fn settle_failure(
        &self,
        session: &mut SessionState,
        visit_attempts: &mut u32,
        draft: AttemptDraft,
        artifact: Option<StageArtifact>,
        verdict: Option<QualityVerdict>,
        failure: FailureClass,
    ) {
        let stage = draft.stage();
        let attempt = draft.attempt();
        warn!(stage = %stage, attempt, failure = %failure, "stage attempt failed");

        match failure.disposition(stage) {
            FailureDisposition::Rollback(edge) => {
                let taken = session.rollbacks_along(edge);
                if taken >= self.rollback_cap(edge) {
                    let cause = FailureClass::RestartBudgetExceeded { edge, count: taken };
                    warn!(edge = %edge, count = taken, "rollback budget exhausted — session failed");
                    session.ledger.record(draft.finalize(
                        artifact,
                        verdict,
                        AttemptOutcome::FailedTerminal,
                        Some(cause.clone()),
                    ));
                    session.finish(SessionOutcome::Failure { cause });
                    return;
                }

                let note = match (&artifact, &verdict) {
                    (Some(a), Some(v)) => plan_rollback(stage, a, v, &session.context, attempt)
                        .map(|(_, note)| note),
                    _ => None,
                }
                .unwrap_or_else(|| FailureNote {
                    stage,
                    attempt,
                    narrative: failure.to_string(),
                });

                let count = session.count_rollback(edge);
                info!(edge = %edge, count, "rolling back");
                session.context.note_failure(note);
                session.ledger.record(draft.finalize(
                    artifact,
                    verdict,
                    AttemptOutcome::RolledBack,
                    Some(failure.clone()),
                ));
                if let Err(err) = session.move_to(edge.target(), &failure.to_string()) {
                    warn!(error = %err, "rollback transition refused");
                    session.finish(SessionOutcome::Failure { cause: failure });
                    return;
                }
                *visit_attempts = 0;
            }
            FailureDisposition::RetryInPlace => {
                if *visit_attempts >= self.config.max_stage_attempts {
                    let cause = FailureClass::StageExhaustion {
                        stage,
                        turns: *visit_attempts,
                    };
                    warn!(
                        stage = %stage,
                        attempts = *visit_attempts,
                        "local retries exhausted — session failed"
                    );
                    session.ledger.record(draft.finalize(
                        artifact,
                        verdict,
                        AttemptOutcome::FailedTerminal,
                        Some(failure),
                    ));
                    session.finish(SessionOutcome::Failure { cause });
                } else {
                    debug!(stage = %stage, attempt, "retrying in place");
                    session.ledger.record(draft.finalize(
                        artifact,
                        verdict,
                        AttemptOutcome::Retried,
                        Some(failure),
                    ));
                }
            }
            FailureDisposition::Terminal => {
                session.ledger.record(draft.finalize(
                    artifact,
                    verdict,
                    AttemptOutcome::FailedTerminal,
                    Some(failure.clone()),
                ));
                session.finish(SessionOutcome::Failure { cause: failure });
            }
        }
    }

    fn rollback_cap(&self, edge: RollbackEdge) -> u32 {
        match edge {
            RollbackEdge::StressToBlueprint => self.config.max_blueprint_rollbacks,
            RollbackEdge::ValidationToDiagnosis => self.config.max_diagnosis_rollbacks,
        }
    }
}

async fn run_stage(
    stage: Stage,
    ctx: &StageContext<'_>,
) -> Result<StageArtifact, FailureClass> {
    match stage {
        Stage::Diagnosis => stages::diagnosis::run(ctx).await,
        Stage::BlueprintDesign => stages::blueprint::run(ctx).await,
        Stage::StressTesting => stages::stress::run(ctx).await,
        Stage::Implementation => stages::implementation::run(ctx).await,
        Stage::Validation => stages::validation::run(ctx).await,
    }
}

fn assemble_outcome(session: SessionState) -> DebugOutcome {
    let summary = session.execution_summary();
    let success = session.outcome().map(|o| o.is_success()).unwrap_or(false);
    let error = match session.outcome() {
        Some(SessionOutcome::Failure { cause }) => Some(cause.to_string()),
        _ => None,
    };
    let final_code = session.context.code().map(String::from);
    info!(
        session_id = %session.id,
        success,
        total_attempts = summary.total_attempts,
        elapsed_ms = summary.total_elapsed_ms,
        "debug session finished"
    );
    DebugOutcome {
        success,
        final_code,
        error,
        summary,
        session,
    }
}
