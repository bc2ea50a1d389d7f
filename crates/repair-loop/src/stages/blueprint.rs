//! Blueprint design stage — iterative propose/critique exchange between the
//! code agent and the solution agent.
//!
//! The code agent proposes a fix blueprint from the accepted diagnosis; the
//! solution agent critiques it; the code agent refines. The loop ends when
//! approval intent is detected in a critique, when either participant starts
//! repeating itself (a distinct failure, not an early pass), or when the
//! turn ceiling is hit.

use regex::Regex;
use tracing::{debug, info};

use super::{missing_dependency, take_turn, timebound, StageContext};
use crate::artifact::StageArtifact;
use crate::capability::{AgentRole, Speaker, TurnMessage};
use crate::error::FailureClass;
use crate::stage::Stage;

const PROPOSE_REQUEST: &str = "Based on the accepted diagnosis, propose a fix blueprint: the \
     change to make, the data it touches, and how it handles the base and general cases. Wrap \
     the blueprint itself in <BLUEPRINT></BLUEPRINT> tags.";

const CRITIQUE_REQUEST: &str = "Review the latest blueprint against the diagnosis and the \
     problem statement. Either accept it, or state what must change and include \
     <REFINEMENT_REQUEST> in your reply.";

const REFINE_REQUEST: &str =
    "Revise the blueprint to address the critique. Keep the <BLUEPRINT></BLUEPRINT> tags.";

/// Pull the blueprint text out of a proposal message.
///
/// Falls back to the whole message when the tags are missing — the agreement
/// protocol is about intent, not markup discipline.
fn extract_blueprint(proposal: &str) -> String {
    if let Ok(tagged) = Regex::new(r"(?s)<BLUEPRINT>(.*?)</BLUEPRINT>") {
        if let Some(caps) = tagged.captures(proposal) {
            return caps[1].trim().to_string();
        }
    }
    proposal.trim().to_string()
}

/// Run the design exchange.
pub(crate) async fn run(ctx: &StageContext<'_>) -> Result<StageArtifact, FailureClass> {
    if ctx.carried.diagnosis().is_none() {
        return Err(missing_dependency(Stage::BlueprintDesign, Stage::Diagnosis));
    }

    let brief = ctx.briefing(Stage::BlueprintDesign);
    let mut transcript = vec![TurnMessage::new(Speaker::Orchestrator, PROPOSE_REQUEST)];

    let mut turns = 1;
    let mut proposal = take_turn(
        ctx,
        Stage::BlueprintDesign,
        AgentRole::Code,
        &brief,
        &mut transcript,
    )
    .await?;

    while turns < ctx.config.max_turns_per_stage {
        transcript.push(TurnMessage::new(Speaker::Orchestrator, CRITIQUE_REQUEST));
        turns += 1;
        let critique = take_turn(
            ctx,
            Stage::BlueprintDesign,
            AgentRole::Solution,
            &brief,
            &mut transcript,
        )
        .await?;

        for speaker in [Speaker::Solution, Speaker::Code] {
            if let Some(score) = ctx.gate.repetition_in(&transcript, speaker) {
                return Err(FailureClass::GateRejection {
                    stage: Stage::BlueprintDesign,
                    reason: format!(
                        "repetition detected: {} turn is redundant with a prior turn (similarity {:.2})",
                        speaker, score
                    ),
                });
            }
        }

        let intent = timebound(
            Stage::BlueprintDesign,
            ctx.config.stage_timeout_ms,
            ctx.gate.approval_intent(&critique, &brief),
        )
        .await?;
        if intent.is_pass() {
            info!(turns, "blueprint approved");
            return Ok(StageArtifact::Blueprint(extract_blueprint(&proposal)));
        }
        debug!(turns, rationale = %intent.rationale, "blueprint not yet approved");

        if turns >= ctx.config.max_turns_per_stage {
            break;
        }
        transcript.push(TurnMessage::new(Speaker::Orchestrator, REFINE_REQUEST));
        turns += 1;
        proposal = take_turn(
            ctx,
            Stage::BlueprintDesign,
            AgentRole::Code,
            &brief,
            &mut transcript,
        )
        .await?;
    }

    Err(FailureClass::StageExhaustion {
        stage: Stage::BlueprintDesign,
        turns,
    })
}
