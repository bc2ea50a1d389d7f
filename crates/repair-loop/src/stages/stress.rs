//! Stress-testing stage — the solution agent probes the agreed blueprint in
//! a dual role: first adversarial tester, then reviewer.

use regex::Regex;
use tracing::info;

use super::{missing_dependency, take_turn, StageContext};
use crate::artifact::{EdgeCaseProbe, StageArtifact, StressReport};
use crate::capability::{AgentRole, Speaker, TurnMessage};
use crate::error::FailureClass;
use crate::stage::Stage;

const PROBE_REQUEST: &str = "Act as an adversarial tester. List the edge cases most likely to \
     break the agreed blueprint — boundaries, empty and degenerate inputs, orderings, \
     overflow. One probe per line, as a `- ` bullet.";

const REVIEW_REQUEST_HEADER: &str = "Now act as the reviewer. For each probe below, judge \
     whether the blueprint survives it. Answer one line per probe in the form \
     `VERDICT <n>: SURVIVES — <why>` or `VERDICT <n>: BREAKS — <why>`.";

/// Parse probe descriptions from the tester's bullet list.
fn parse_probes(response: &str) -> Vec<String> {
    let bullet = match Regex::new(r"(?m)^\s*(?:[-*]|\d+[.)])\s+(.+)$") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    bullet
        .captures_iter(response)
        .map(|caps| caps[1].trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Match reviewer verdicts back to the numbered probes.
///
/// A probe without an explicit verdict is treated as surviving — only an
/// explicit break is allowed to unwind the agreed design.
fn parse_verdicts(probes: &[String], review: &str) -> Vec<EdgeCaseProbe> {
    let verdict =
        Regex::new(r"(?im)^\s*VERDICT\s+(\d+)\s*:\s*(SURVIVES|BREAKS)\s*(?:[—–-]+\s*(.*))?$").ok();

    let mut parsed: Vec<EdgeCaseProbe> = probes
        .iter()
        .map(|description| EdgeCaseProbe {
            description: description.clone(),
            expectation: "no explicit verdict recorded".to_string(),
            survived: true,
        })
        .collect();

    if let Some(re) = verdict {
        for caps in re.captures_iter(review) {
            let index: usize = match caps[1].parse::<usize>() {
                Ok(n) if n >= 1 && n <= parsed.len() => n - 1,
                _ => continue,
            };
            parsed[index].survived = caps[2].eq_ignore_ascii_case("SURVIVES");
            if let Some(why) = caps.get(3) {
                let why = why.as_str().trim();
                if !why.is_empty() {
                    parsed[index].expectation = why.to_string();
                }
            }
        }
    }
    parsed
}

/// Run the dual-role probing exchange.
pub(crate) async fn run(ctx: &StageContext<'_>) -> Result<StageArtifact, FailureClass> {
    if ctx.carried.blueprint().is_none() {
        return Err(missing_dependency(Stage::StressTesting, Stage::BlueprintDesign));
    }

    let brief = ctx.briefing(Stage::StressTesting);
    let mut transcript = vec![TurnMessage::new(Speaker::Orchestrator, PROBE_REQUEST)];

    let probes_text = take_turn(
        ctx,
        Stage::StressTesting,
        AgentRole::Solution,
        &brief,
        &mut transcript,
    )
    .await?;
    let probes = parse_probes(&probes_text);

    if probes.is_empty() {
        // Nothing parseable to review; the validity gate judges the report.
        return Ok(StageArtifact::StressReport(StressReport {
            probes: Vec::new(),
            summary: probes_text,
        }));
    }

    let numbered: Vec<String> = probes
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {}", i + 1, p))
        .collect();
    transcript.push(TurnMessage::new(
        Speaker::Orchestrator,
        format!("{}\n{}", REVIEW_REQUEST_HEADER, numbered.join("\n")),
    ));

    let review = take_turn(
        ctx,
        Stage::StressTesting,
        AgentRole::Solution,
        &brief,
        &mut transcript,
    )
    .await?;

    let judged = parse_verdicts(&probes, &review);
    info!(
        probes = judged.len(),
        failing = judged.iter().filter(|p| !p.survived).count(),
        "stress report assembled"
    );
    Ok(StageArtifact::StressReport(StressReport {
        probes: judged,
        summary: review,
    }))
}
