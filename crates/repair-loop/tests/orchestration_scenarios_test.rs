//! End-to-end session scenarios driven by scripted fakes.
//!
//! The whole state machine runs offline: agents, assessor, and executor are
//! deterministic scripts, so every assertion here is about orchestration,
//! not model behavior.

mod common;

use common::*;
use repair_loop::{replay, AttemptOutcome, Orchestrator, ReplayedOutcome, Stage};

#[tokio::test]
async fn clean_single_pass_fixes_the_defect() {
    init_tracing();
    let orchestrator = Orchestrator::new(capabilities(
        happy_solution(),
        happy_code(),
        ScriptedAssessor::passing(),
        ScriptedExecutor::passing(),
    ));

    let outcome = orchestrator.debug_problem(problem()).await;

    assert!(outcome.success, "expected success: {:?}", outcome.error);
    assert!(outcome.error.is_none());
    assert!(outcome.final_code.as_ref().unwrap().contains("def f(xs)"));

    // Single pass through all five stages, zero rollbacks.
    assert_eq!(outcome.summary.total_attempts, 5);
    for stage in Stage::ALL {
        assert_eq!(outcome.summary.attempts_per_stage[&stage], 1);
    }
    assert_eq!(outcome.summary.rollbacks_to_blueprint, 0);
    assert_eq!(outcome.summary.rollbacks_to_diagnosis, 0);
    assert!(outcome
        .session
        .ledger
        .attempts()
        .iter()
        .all(|a| a.outcome == AttemptOutcome::Advanced));

    assert!(outcome.session.ledger.is_valid_path());
    let report = replay(&outcome.session.ledger);
    assert!(report.consistent);
    assert_eq!(report.outcome, Some(ReplayedOutcome::Success));
    assert!(outcome.summary_line().contains("FIXED"));
}

#[tokio::test]
async fn stress_failure_rolls_back_to_blueprint_with_probe_context() {
    let solution = ScriptedAgent::new("acknowledged")
        .script(Stage::Diagnosis, &["the sign of negative totals is dropped"])
        .script(
            Stage::BlueprintDesign,
            &["looks right for the general case", "covers the probes now"],
        )
        .script(
            Stage::StressTesting,
            &[
                "- empty input list\n- single element",
                "VERDICT 1: BREAKS — the blueprint indexes xs[0] unconditionally\n\
                 VERDICT 2: SURVIVES — loop runs once",
                "- empty input list\n- single element",
                "VERDICT 1: SURVIVES — guarded by an early return now\n\
                 VERDICT 2: SURVIVES — loop runs once",
            ],
        );
    let code = ScriptedAgent::new("acknowledged")
        .script(
            Stage::BlueprintDesign,
            &[
                "<BLUEPRINT>fold the signed values left to right</BLUEPRINT>",
                "<BLUEPRINT>return 0 for empty input, then fold the signed values</BLUEPRINT>",
            ],
        )
        .script(Stage::Implementation, &[VALID_CODE]);

    let orchestrator = Orchestrator::new(capabilities(
        solution,
        code,
        ScriptedAssessor::passing(),
        ScriptedExecutor::passing(),
    ));
    let outcome = orchestrator.debug_problem(problem()).await;

    assert!(outcome.success, "expected success: {:?}", outcome.error);
    assert_eq!(outcome.summary.rollbacks_to_blueprint, 1);
    assert_eq!(outcome.summary.rollbacks_to_diagnosis, 0);
    // Exactly one blueprint re-entry.
    assert_eq!(outcome.summary.attempts_per_stage[&Stage::BlueprintDesign], 2);
    assert_eq!(outcome.summary.attempts_per_stage[&Stage::StressTesting], 2);

    // The failed stress attempt is recorded as rolled back, traceable to
    // the note that carried its failing probe.
    let stress_attempts: Vec<_> = outcome
        .session
        .ledger
        .attempts()
        .iter()
        .filter(|a| a.stage == Stage::StressTesting)
        .collect();
    assert_eq!(stress_attempts[0].outcome, AttemptOutcome::RolledBack);
    assert_eq!(stress_attempts[1].outcome, AttemptOutcome::Advanced);

    let notes = outcome.session.context.failure_notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].stage, Stage::StressTesting);
    assert_eq!(notes[0].attempt, 1);
    assert!(notes[0].narrative.contains("empty input list"));
    assert!(notes[0].narrative.contains("indexes xs[0] unconditionally"));

    // The redesign briefing carried the failure narrative.
    let briefing = outcome
        .session
        .context
        .briefing_for(Stage::BlueprintDesign, &problem());
    assert!(briefing.contains("empty input list"));

    assert!(outcome.session.ledger.is_valid_path());
    assert_eq!(
        replay(&outcome.session.ledger).outcome,
        Some(ReplayedOutcome::Success)
    );
}

#[tokio::test]
async fn repeated_validation_failures_exhaust_the_restart_budget() {
    let orchestrator = Orchestrator::new(capabilities(
        happy_solution(),
        happy_code(),
        ScriptedAssessor::passing(),
        ScriptedExecutor::always_failing("AssertionError: expected -5, got 5"),
    ));
    let outcome = orchestrator.debug_problem(problem()).await;

    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("rollback budget exceeded"), "{}", error);
    assert!(error.contains("validation→diagnosis"), "{}", error);

    // Default cap is 2: exactly two diagnosis re-entries before giving up.
    assert_eq!(outcome.summary.rollbacks_to_diagnosis, 2);
    assert_eq!(outcome.summary.attempts_per_stage[&Stage::Diagnosis], 3);
    assert_eq!(outcome.summary.attempts_per_stage[&Stage::Validation], 3);

    let validation_attempts: Vec<_> = outcome
        .session
        .ledger
        .attempts()
        .iter()
        .filter(|a| a.stage == Stage::Validation)
        .collect();
    assert_eq!(validation_attempts[0].outcome, AttemptOutcome::RolledBack);
    assert_eq!(validation_attempts[1].outcome, AttemptOutcome::RolledBack);
    assert_eq!(
        validation_attempts[2].outcome,
        AttemptOutcome::FailedTerminal
    );

    // Every validation rollback carried the full chain: blueprint, code,
    // and the error signal.
    let notes = outcome.session.context.failure_notes();
    assert_eq!(notes.len(), 2);
    for note in notes {
        assert_eq!(note.stage, Stage::Validation);
        assert!(note.narrative.contains("Blueprint that was implemented"));
        assert!(note.narrative.contains("Code that failed"));
        assert!(note.narrative.contains("AssertionError: expected -5"));
    }
    assert!(notes[0].narrative.contains("start the scan at index 0"));
    assert!(notes[0].narrative.contains("def f(xs)"));

    assert!(outcome.session.ledger.is_valid_path());
    assert_eq!(
        replay(&outcome.session.ledger).outcome,
        Some(ReplayedOutcome::Failure)
    );
}

#[tokio::test]
async fn invalid_implementation_exhausts_local_retries_without_rollback() {
    let code = ScriptedAgent::new("acknowledged")
        .script(
            Stage::BlueprintDesign,
            &["<BLUEPRINT>fold the signed values</BLUEPRINT>"],
        )
        .script(
            Stage::Implementation,
            &[INVALID_CODE, INVALID_CODE, INVALID_CODE],
        );

    let orchestrator = Orchestrator::new(capabilities(
        happy_solution(),
        code,
        ScriptedAssessor::passing(),
        ScriptedExecutor::passing(),
    ));
    let outcome = orchestrator.debug_problem(problem()).await;

    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("implementation"), "{}", error);
    assert!(error.contains("exhausted"), "{}", error);

    let implementation_attempts: Vec<_> = outcome
        .session
        .ledger
        .attempts()
        .iter()
        .filter(|a| a.stage == Stage::Implementation)
        .collect();
    assert_eq!(implementation_attempts.len(), 3);
    assert_eq!(implementation_attempts[0].outcome, AttemptOutcome::Retried);
    assert_eq!(implementation_attempts[1].outcome, AttemptOutcome::Retried);
    assert_eq!(
        implementation_attempts[2].outcome,
        AttemptOutcome::FailedTerminal
    );
    // Each attempt's own failure was the structural rejection.
    for attempt in &implementation_attempts[..2] {
        let failure = attempt.failure.as_ref().unwrap();
        assert!(failure.to_string().contains("structurally invalid"));
    }

    // Implementation is not rollback-eligible: no rollback anywhere.
    assert_eq!(outcome.summary.rollbacks_to_blueprint, 0);
    assert_eq!(outcome.summary.rollbacks_to_diagnosis, 0);
    assert!(outcome
        .session
        .ledger
        .transitions()
        .iter()
        .all(|t| !t.is_rollback()));
    assert_eq!(outcome.summary.attempts_per_stage[&Stage::Validation], 0);

    assert!(outcome.session.ledger.is_valid_path());
    assert_eq!(
        replay(&outcome.session.ledger).outcome,
        Some(ReplayedOutcome::Failure)
    );
}

#[tokio::test]
async fn diagnosis_gate_rejection_retries_then_advances() {
    let assessor = ScriptedAssessor::passing().script(Stage::Diagnosis, &[false, true]);
    let solution = ScriptedAgent::new("acknowledged")
        .script(
            Stage::Diagnosis,
            &["it is probably the loop", "the loop starts at index 1"],
        )
        .script(Stage::BlueprintDesign, &["approved"])
        .script(Stage::StressTesting, &["- empty input", "VERDICT 1: SURVIVES — fine"]);

    let orchestrator = Orchestrator::new(capabilities(
        solution,
        happy_code(),
        assessor,
        ScriptedExecutor::passing(),
    ));
    let outcome = orchestrator.debug_problem(problem()).await;

    assert!(outcome.success, "expected success: {:?}", outcome.error);
    assert_eq!(outcome.summary.attempts_per_stage[&Stage::Diagnosis], 2);

    let diagnosis_attempts: Vec<_> = outcome
        .session
        .ledger
        .attempts()
        .iter()
        .filter(|a| a.stage == Stage::Diagnosis)
        .collect();
    assert_eq!(diagnosis_attempts[0].outcome, AttemptOutcome::Retried);
    assert_eq!(diagnosis_attempts[1].outcome, AttemptOutcome::Advanced);
    // The accepted diagnosis is the second one.
    assert_eq!(
        outcome.session.context.diagnosis(),
        Some("the loop starts at index 1")
    );
}
