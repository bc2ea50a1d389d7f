//! Stage protocols — bounded multi-turn exchanges producing stage artifacts.
//!
//! Each stage reads the carried context and the problem spec, talks to its
//! participants through the capability traits, and returns either an artifact
//! or a classified failure. Stages never transition the session themselves
//! and never mutate another stage's artifacts.

pub(crate) mod blueprint;
pub(crate) mod diagnosis;
pub(crate) mod implementation;
pub(crate) mod stress;
pub(crate) mod validation;

use std::future::Future;
use std::time::Duration;

use crate::capability::{AgentRole, Capabilities, TurnMessage};
use crate::config::OrchestratorConfig;
use crate::context::{CarriedContext, ProblemSpec};
use crate::error::FailureClass;
use crate::gate::QualityGate;
use crate::stage::Stage;

/// Read-only view a stage runs against.
pub(crate) struct StageContext<'a> {
    pub problem: &'a ProblemSpec,
    pub carried: &'a CarriedContext,
    pub capabilities: &'a Capabilities,
    pub gate: &'a QualityGate,
    pub config: &'a OrchestratorConfig,
}

impl StageContext<'_> {
    /// The briefing handed to participants of `stage`.
    pub(crate) fn briefing(&self, stage: Stage) -> String {
        self.carried.briefing_for(stage, self.problem)
    }
}

/// Await an external capability call under the configured timeout.
///
/// A timeout aborts the in-flight call and resolves to a recorded failure;
/// it never hangs the session.
pub(crate) async fn timebound<T, F>(
    stage: Stage,
    timeout_ms: u64,
    fut: F,
) -> Result<T, FailureClass>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let result = if timeout_ms == 0 {
        fut.await
    } else {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => {
                return Err(FailureClass::ExternalCapability {
                    stage,
                    detail: format!("timed out after {}ms", timeout_ms),
                })
            }
        }
    };
    result.map_err(|e| FailureClass::ExternalCapability {
        stage,
        detail: e.to_string(),
    })
}

/// Take one agent turn and append it to the transcript.
pub(crate) async fn take_turn(
    ctx: &StageContext<'_>,
    stage: Stage,
    role: AgentRole,
    brief: &str,
    transcript: &mut Vec<TurnMessage>,
) -> Result<String, FailureClass> {
    let response = timebound(
        stage,
        ctx.config.stage_timeout_ms,
        ctx.capabilities
            .agent(role)
            .respond(role, stage, brief, transcript),
    )
    .await?;
    transcript.push(TurnMessage::new(role.into(), response.clone()));
    Ok(response)
}

/// Failure for a stage invoked before its upstream artifact was accepted.
///
/// Unreachable when driven by the orchestrator, which only advances along
/// the declared graph.
pub(crate) fn missing_dependency(stage: Stage, dependency: Stage) -> FailureClass {
    FailureClass::GateRejection {
        stage,
        reason: format!("no accepted {} artifact available", dependency),
    }
}
