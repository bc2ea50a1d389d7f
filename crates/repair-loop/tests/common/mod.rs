//! Scripted deterministic fakes for the capability contracts.
//!
//! Each fake replays a per-stage queue of canned responses and falls back to
//! a default once the queue drains, so tests fully control the session path
//! without any model or sandbox.

// Not every test binary uses every fake.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use repair_loop::{
    AgentRole, Capabilities, CaseResult, CodeExecutor, ExecutionReport, ProblemSpec,
    QualityAssessor, QualityVerdict, ReasoningAgent, Stage, TestCase, TurnMessage,
};

/// Install the env-filtered subscriber once, so `RUST_LOG=repair_loop=debug`
/// surfaces transition logs in test output.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Reasoning agent replaying scripted responses per stage.
pub struct ScriptedAgent {
    scripts: Mutex<HashMap<Stage, VecDeque<String>>>,
    fallback: String,
}

impl ScriptedAgent {
    pub fn new(fallback: &str) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: fallback.to_string(),
        }
    }

    pub fn script(self, stage: Stage, responses: &[&str]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .extend(responses.iter().map(|r| r.to_string()));
        self
    }
}

#[async_trait]
impl ReasoningAgent for ScriptedAgent {
    async fn respond(
        &self,
        _role: AgentRole,
        stage: Stage,
        _brief: &str,
        _transcript: &[TurnMessage],
    ) -> Result<String> {
        let mut scripts = self.scripts.lock().unwrap();
        Ok(scripts
            .get_mut(&stage)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Reasoning agent whose every call errors, for capability-failure paths.
pub struct ErroringAgent;

#[async_trait]
impl ReasoningAgent for ErroringAgent {
    async fn respond(
        &self,
        _role: AgentRole,
        _stage: Stage,
        _brief: &str,
        _transcript: &[TurnMessage],
    ) -> Result<String> {
        Err(anyhow!("inference backend unreachable"))
    }
}

/// Assessor replaying scripted pass/fail verdicts per stage, defaulting to
/// pass once a queue drains.
pub struct ScriptedAssessor {
    verdicts: Mutex<HashMap<Stage, VecDeque<bool>>>,
}

impl ScriptedAssessor {
    pub fn passing() -> Self {
        Self {
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(self, stage: Stage, verdicts: &[bool]) -> Self {
        self.verdicts
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .extend(verdicts.iter().copied());
        self
    }
}

#[async_trait]
impl QualityAssessor for ScriptedAssessor {
    async fn assess(&self, stage: Stage, _artifact: &str, _context: &str) -> Result<QualityVerdict> {
        let pass = self
            .verdicts
            .lock()
            .unwrap()
            .get_mut(&stage)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(true);
        Ok(if pass {
            QualityVerdict::pass("scripted pass").with_confidence(0.9)
        } else {
            QualityVerdict::fail("scripted rejection").with_confidence(0.9)
        })
    }
}

pub fn pass_report() -> ExecutionReport {
    ExecutionReport {
        passed: true,
        case_results: vec![CaseResult {
            assertion: "assert f([-1, 1]) == 0".to_string(),
            passed: true,
            error: None,
        }],
        captured_errors: None,
    }
}

pub fn fail_report(error: &str) -> ExecutionReport {
    ExecutionReport {
        passed: false,
        case_results: vec![CaseResult {
            assertion: "assert f([-1, 1]) == 0".to_string(),
            passed: false,
            error: Some(error.to_string()),
        }],
        captured_errors: Some(error.to_string()),
    }
}

/// Executor replaying scripted reports, defaulting to the last one queued
/// (or a passing report when never scripted).
pub struct ScriptedExecutor {
    reports: Mutex<VecDeque<ExecutionReport>>,
    default: ExecutionReport,
}

impl ScriptedExecutor {
    pub fn passing() -> Self {
        Self {
            reports: Mutex::new(VecDeque::new()),
            default: pass_report(),
        }
    }

    pub fn always_failing(error: &str) -> Self {
        Self {
            reports: Mutex::new(VecDeque::new()),
            default: fail_report(error),
        }
    }

    pub fn script(self, reports: Vec<ExecutionReport>) -> Self {
        self.reports.lock().unwrap().extend(reports);
        self
    }
}

#[async_trait]
impl CodeExecutor for ScriptedExecutor {
    async fn execute(&self, _code: &str, _test_cases: &[TestCase]) -> Result<ExecutionReport> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// Executor that never resolves, for timeout paths.
pub struct HangingExecutor;

#[async_trait]
impl CodeExecutor for HangingExecutor {
    async fn execute(&self, _code: &str, _test_cases: &[TestCase]) -> Result<ExecutionReport> {
        std::future::pending().await
    }
}

pub const VALID_CODE: &str = "```python\ndef f(xs):\n    return sum(xs)\n```";
pub const INVALID_CODE: &str = "```python\ndef f(xs:";

/// Solution agent scripted for a clean single pass.
pub fn happy_solution() -> ScriptedAgent {
    ScriptedAgent::new("acknowledged")
        .script(
            Stage::Diagnosis,
            &["The loop starts at index 1, so the first element is never summed."],
        )
        .script(
            Stage::BlueprintDesign,
            &["The blueprint covers the base cases and matches the diagnosis. Approved."],
        )
        .script(
            Stage::StressTesting,
            &[
                "- empty input list\n- single element",
                "VERDICT 1: SURVIVES — early return covers it\nVERDICT 2: SURVIVES — loop runs once",
            ],
        )
}

/// Code agent scripted for a clean single pass.
pub fn happy_code() -> ScriptedAgent {
    ScriptedAgent::new("acknowledged")
        .script(
            Stage::BlueprintDesign,
            &["<BLUEPRINT>start the scan at index 0 and keep the running sign</BLUEPRINT>"],
        )
        .script(Stage::Implementation, &[VALID_CODE])
}

pub fn capabilities(
    solution: impl ReasoningAgent + 'static,
    code: impl ReasoningAgent + 'static,
    assessor: impl QualityAssessor + 'static,
    executor: impl CodeExecutor + 'static,
) -> Capabilities {
    Capabilities {
        solution: Arc::new(solution),
        code: Arc::new(code),
        assessor: Arc::new(assessor),
        executor: Arc::new(executor),
    }
}

pub fn problem() -> ProblemSpec {
    ProblemSpec::new(
        "f(xs) must return the signed sum of xs, but negative totals come back wrong",
        vec![
            TestCase::new("assert f([-1, 1]) == 0"),
            TestCase::new("assert f([-2, -3]) == -5"),
        ],
    )
    .with_current_code("def f(xs):\n    return sum(abs(x) for x in xs)")
    .with_error_logs("AssertionError: expected -5, got 5")
}
