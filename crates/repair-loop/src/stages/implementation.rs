//! Implementation stage — the code agent translates the approved blueprint
//! into a concrete code unit.

use tracing::info;

use super::{missing_dependency, take_turn, StageContext};
use crate::artifact::StageArtifact;
use crate::capability::{AgentRole, Speaker, TurnMessage};
use crate::error::FailureClass;
use crate::gate::extract_code_unit;
use crate::stage::Stage;

const IMPLEMENT_REQUEST: &str = "Implement the approved blueprint as a complete, runnable code \
     unit matching the problem's required signature. Return the code in a fenced code block or \
     inside <FINAL_CODE></FINAL_CODE> tags.";

/// Run the implementation turn.
///
/// The structural judgment happens at the gate; this stage only produces
/// the candidate. When the response carries no extractable unit the raw
/// response is returned so the gate can reject it with a precise reason.
pub(crate) async fn run(ctx: &StageContext<'_>) -> Result<StageArtifact, FailureClass> {
    if ctx.carried.blueprint().is_none() {
        return Err(missing_dependency(Stage::Implementation, Stage::BlueprintDesign));
    }

    let brief = ctx.briefing(Stage::Implementation);
    let mut transcript = vec![TurnMessage::new(Speaker::Orchestrator, IMPLEMENT_REQUEST)];

    let response = take_turn(
        ctx,
        Stage::Implementation,
        AgentRole::Code,
        &brief,
        &mut transcript,
    )
    .await?;

    let code = extract_code_unit(&response).unwrap_or(response);
    info!(bytes = code.len(), "candidate code produced");
    Ok(StageArtifact::Code(code))
}
