//! Validation stage — orchestrator-only execution of the candidate code
//! against the test cases.

use tracing::info;

use super::{missing_dependency, timebound, StageContext};
use crate::artifact::StageArtifact;
use crate::error::FailureClass;
use crate::stage::Stage;

/// Execute the accepted code unit against the problem's test cases.
///
/// There is no gate here: the execution report is the verdict.
pub(crate) async fn run(ctx: &StageContext<'_>) -> Result<StageArtifact, FailureClass> {
    let code = match ctx.carried.code() {
        Some(code) => code,
        None => return Err(missing_dependency(Stage::Validation, Stage::Implementation)),
    };

    let report = timebound(
        Stage::Validation,
        ctx.config.stage_timeout_ms,
        ctx.capabilities
            .executor
            .execute(code, &ctx.problem.test_cases),
    )
    .await?;

    info!(
        passed = report.passed,
        cases = report.case_results.len(),
        "candidate executed against test cases"
    );
    Ok(StageArtifact::Validation(report))
}
