//! Capability contracts for external collaborators.
//!
//! The engine never talks to a model, a transport, or a sandbox directly.
//! Everything semantic is reached through the three traits below, bound to
//! concrete objects at orchestrator construction. The state machine is fully
//! exercisable with deterministic fakes substituted for all of them.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::TestCase;
use crate::gate::QualityVerdict;
use crate::stage::Stage;

/// Reasoning roles bound at session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Strategy owner: diagnoses, critiques designs, stress-tests.
    Solution,
    /// Implementation owner: proposes blueprints, writes code.
    Code,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solution => write!(f, "solution"),
            Self::Code => write!(f, "code"),
        }
    }
}

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Solution,
    Code,
    /// Deterministic interventions injected by the engine itself
    /// (retry feedback, format nudges).
    Orchestrator,
}

impl From<AgentRole> for Speaker {
    fn from(role: AgentRole) -> Self {
        match role {
            AgentRole::Solution => Self::Solution,
            AgentRole::Code => Self::Code,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solution => write!(f, "solution"),
            Self::Code => write!(f, "code"),
            Self::Orchestrator => write!(f, "orchestrator"),
        }
    }
}

/// One turn of a stage's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMessage {
    pub speaker: Speaker,
    pub content: String,
}

impl TurnMessage {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            speaker,
            content: content.into(),
        }
    }
}

/// A reasoning agent able to take a turn in a stage conversation.
///
/// `brief` is the stage context assembled by the engine (problem, carried
/// artifacts, failure narratives); `transcript` is the conversation so far.
/// The returned string is the agent's next message, verbatim.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    async fn respond(
        &self,
        role: AgentRole,
        stage: Stage,
        brief: &str,
        transcript: &[TurnMessage],
    ) -> Result<String>;
}

/// A model-backed evaluator producing graded quality verdicts.
///
/// Consulted for the semantic checkpoints (diagnosis depth, stress-report
/// validity, blueprint approval intent). Structural checks never go through
/// this trait.
#[async_trait]
pub trait QualityAssessor: Send + Sync {
    async fn assess(&self, stage: Stage, artifact: &str, context: &str) -> Result<QualityVerdict>;
}

/// Result of executing one test assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub assertion: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of running a candidate code unit against the test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Whether every case passed.
    pub passed: bool,
    /// Per-case results, in test-case order.
    pub case_results: Vec<CaseResult>,
    /// Captured stderr / runtime errors, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_errors: Option<String>,
}

impl ExecutionReport {
    /// Compact failure description for carried context and logs.
    pub fn failure_digest(&self) -> String {
        let failed: Vec<String> = self
            .case_results
            .iter()
            .filter(|c| !c.passed)
            .map(|c| match &c.error {
                Some(err) => format!("{} ({})", c.assertion, err),
                None => c.assertion.clone(),
            })
            .collect();

        let mut digest = if failed.is_empty() {
            "no failing cases recorded".to_string()
        } else {
            format!("failed cases: {}", failed.join("; "))
        };
        if let Some(errors) = &self.captured_errors {
            digest.push_str(&format!("; captured errors: {}", errors));
        }
        digest
    }
}

/// Sandboxed code execution, used only at the validation stage.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, code: &str, test_cases: &[TestCase]) -> Result<ExecutionReport>;
}

/// The full set of collaborator bindings for one orchestrator.
///
/// All bindings are shared handles, so one `Capabilities` value can serve
/// any number of concurrent sessions.
#[derive(Clone)]
pub struct Capabilities {
    pub solution: Arc<dyn ReasoningAgent>,
    pub code: Arc<dyn ReasoningAgent>,
    pub assessor: Arc<dyn QualityAssessor>,
    pub executor: Arc<dyn CodeExecutor>,
}

impl Capabilities {
    /// The reasoning agent bound to `role`.
    pub fn agent(&self, role: AgentRole) -> &Arc<dyn ReasoningAgent> {
        match role {
            AgentRole::Solution => &self.solution,
            AgentRole::Code => &self.code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(assertion: &str, passed: bool, error: Option<&str>) -> CaseResult {
        CaseResult {
            assertion: assertion.to_string(),
            passed,
            error: error.map(String::from),
        }
    }

    #[test]
    fn test_failure_digest_lists_failed_cases() {
        let report = ExecutionReport {
            passed: false,
            case_results: vec![
                case("assert f(1) == 2", true, None),
                case("assert f(2) == 4", false, Some("got 5")),
            ],
            captured_errors: None,
        };
        let digest = report.failure_digest();
        assert!(digest.contains("assert f(2) == 4"));
        assert!(digest.contains("got 5"));
        assert!(!digest.contains("assert f(1) == 2"));
    }

    #[test]
    fn test_failure_digest_includes_captured_errors() {
        let report = ExecutionReport {
            passed: false,
            case_results: vec![],
            captured_errors: Some("IndexError: list index out of range".to_string()),
        };
        let digest = report.failure_digest();
        assert!(digest.contains("no failing cases recorded"));
        assert!(digest.contains("IndexError"));
    }

    #[test]
    fn test_speaker_from_role() {
        assert_eq!(Speaker::from(AgentRole::Solution), Speaker::Solution);
        assert_eq!(Speaker::from(AgentRole::Code), Speaker::Code);
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&AgentRole::Solution).unwrap();
        assert_eq!(json, "\"solution\"");
    }

    #[test]
    fn test_execution_report_serde_roundtrip() {
        let report = ExecutionReport {
            passed: true,
            case_results: vec![case("assert f(0) == 0", true, None)],
            captured_errors: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        let restored: ExecutionReport = serde_json::from_str(&json).unwrap();
        assert!(restored.passed);
        assert_eq!(restored.case_results.len(), 1);
    }
}
