//! Diagnosis stage — root-cause analysis by the solution agent.

use tracing::info;

use super::{take_turn, StageContext};
use crate::artifact::StageArtifact;
use crate::capability::{AgentRole, Speaker, TurnMessage};
use crate::error::FailureClass;
use crate::stage::Stage;

const ANALYSIS_REQUEST: &str = "Analyze the failing code against the problem statement and the \
     error log. State the root cause of the defect: what the code computes, where it first \
     deviates from the requirement, and why.";

const EMPTY_RESPONSE_NUDGE: &str =
    "The previous analysis was empty. Provide the root-cause analysis.";

/// Run the diagnosis exchange.
///
/// The orchestrator opens with the analysis request; the solution agent
/// answers. An empty answer gets a nudge and another turn, up to the stage's
/// turn budget. Depth is judged afterwards by the quality gate, not here.
pub(crate) async fn run(ctx: &StageContext<'_>) -> Result<StageArtifact, FailureClass> {
    let brief = ctx.briefing(Stage::Diagnosis);
    let mut transcript = vec![TurnMessage::new(Speaker::Orchestrator, ANALYSIS_REQUEST)];

    let mut turns = 0;
    while turns < ctx.config.max_turns_per_stage {
        turns += 1;
        let response = take_turn(
            ctx,
            Stage::Diagnosis,
            AgentRole::Solution,
            &brief,
            &mut transcript,
        )
        .await?;

        let analysis = response.trim();
        if !analysis.is_empty() {
            info!(turns, "root-cause analysis produced");
            return Ok(StageArtifact::Diagnosis(analysis.to_string()));
        }
        transcript.push(TurnMessage::new(Speaker::Orchestrator, EMPTY_RESPONSE_NUDGE));
    }

    Err(FailureClass::StageExhaustion {
        stage: Stage::Diagnosis,
        turns,
    })
}
