//! Quality gate — structured verdicts and per-stage acceptance checks.
//!
//! The gate is the single checkpoint the orchestrator consults after a stage
//! produces an artifact. Semantic judgments (diagnosis depth, stress-report
//! validity, blueprint approval intent) are delegated to the injected
//! [`QualityAssessor`]; everything else here is deterministic so the state
//! machine can be driven end-to-end by a scripted fake.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::StageArtifact;
use crate::capability::{QualityAssessor, Speaker, TurnMessage};
use crate::stage::Stage;

/// Binary gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Structured verdict consumed by the orchestrator's transition logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub verdict: Verdict,
    pub rationale: String,
    /// Confidence in the verdict (0.0–1.0), when the evaluator grades one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl QualityVerdict {
    pub fn pass(rationale: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Pass,
            rationale: rationale.into(),
            confidence: None,
        }
    }

    pub fn fail(rationale: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Fail,
            rationale: rationale.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Marker a participant emits to explicitly request another design round.
pub const REFINEMENT_TAG: &str = "<REFINEMENT_REQUEST>";

/// How many trailing turns the repetition detector inspects.
const REPETITION_WINDOW: usize = 4;

/// Token-set (Jaccard) similarity between two messages.
///
/// Case-insensitive, split on non-alphanumeric runs. Two empty messages are
/// maximally similar.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let tokens = |s: &str| -> HashSet<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    };
    let (set_a, set_b) = (tokens(a), tokens(b));
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

/// Extract the code unit from an agent response.
///
/// Preference order: `<FINAL_CODE>` tags, then the first closed code fence,
/// then the raw response. Returns `None` when the response opens a fence it
/// never closes — a truncated unit is not extractable.
pub fn extract_code_unit(response: &str) -> Option<String> {
    let tagged = Regex::new(r"(?s)<FINAL_CODE>(.*?)</FINAL_CODE>").ok()?;
    if let Some(caps) = tagged.captures(response) {
        return Some(caps[1].trim().to_string());
    }

    let fenced = Regex::new(r"(?s)```[a-zA-Z0-9_+-]*\n(.*?)```").ok()?;
    if let Some(caps) = fenced.captures(response) {
        return Some(caps[1].trim().to_string());
    }

    if response.contains("```") {
        // A fence was opened but never closed.
        return None;
    }

    Some(response.trim().to_string())
}

/// Check that bracket delimiters in `code` are balanced.
///
/// Quote-aware: delimiters inside single- or double-quoted literals are
/// ignored, as are backslash-escaped quotes.
fn balanced_delimiters(code: &str) -> std::result::Result<(), String> {
    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') | (None, '[') | (None, '{') => stack.push(c),
            (None, ')') | (None, ']') | (None, '}') => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Err(format!("unmatched closing delimiter `{}`", c));
                }
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed delimiter `{}`", open));
    }
    Ok(())
}

/// Structural well-formedness check for an implementation response.
///
/// Never judges semantic correctness — that is deferred to validation.
pub fn validate_code_unit(response: &str) -> QualityVerdict {
    let code = match extract_code_unit(response) {
        Some(code) => code,
        None => {
            return QualityVerdict::fail("unterminated code fence").with_confidence(1.0);
        }
    };
    if code.is_empty() {
        return QualityVerdict::fail("empty code unit").with_confidence(1.0);
    }
    if let Err(reason) = balanced_delimiters(&code) {
        return QualityVerdict::fail(reason).with_confidence(1.0);
    }
    QualityVerdict::pass("structurally complete code unit").with_confidence(1.0)
}

/// The quality gate consulted at stage checkpoints.
pub struct QualityGate {
    assessor: Arc<dyn QualityAssessor>,
    repetition_threshold: f64,
}

impl QualityGate {
    pub fn new(assessor: Arc<dyn QualityAssessor>) -> Self {
        Self {
            assessor,
            repetition_threshold: 0.8,
        }
    }

    pub fn with_repetition_threshold(mut self, threshold: f64) -> Self {
        self.repetition_threshold = threshold;
        self
    }

    /// Evaluate a stage artifact against its checkpoint.
    ///
    /// - DIAGNOSIS / STRESS_TESTING: graded semantic assessment.
    /// - STRESS_TESTING short-circuits on a deterministically failing probe.
    /// - BLUEPRINT_DESIGN: approval and repetition were already composed
    ///   turn-by-turn inside the stage, so an artifact arriving here was
    ///   approved.
    /// - IMPLEMENTATION: structural check only.
    /// - VALIDATION: no gate — the execution report speaks for itself.
    pub async fn evaluate(
        &self,
        stage: Stage,
        artifact: &StageArtifact,
        context: &str,
    ) -> Result<QualityVerdict> {
        let verdict = match (stage, artifact) {
            (Stage::StressTesting, StageArtifact::StressReport(report)) => {
                match report.first_failing() {
                    Some(probe) => QualityVerdict::fail(format!(
                        "blueprint breaks under probe: {} — {}",
                        probe.description, probe.expectation
                    ))
                    .with_confidence(1.0),
                    None => {
                        self.assessor
                            .assess(stage, &report.rendered(), context)
                            .await?
                    }
                }
            }
            (Stage::Diagnosis, _) => {
                self.assessor
                    .assess(stage, &artifact.rendered(), context)
                    .await?
            }
            (Stage::BlueprintDesign, _) => {
                QualityVerdict::pass("approval detected during design exchange")
            }
            (Stage::Implementation, _) => validate_code_unit(&artifact.rendered()),
            (Stage::Validation, _) | (Stage::StressTesting, _) => {
                QualityVerdict::pass("direct execution outcome")
            }
        };

        debug!(
            stage = %stage,
            verdict = %verdict.verdict,
            rationale = %verdict.rationale,
            "gate verdict"
        );
        Ok(verdict)
    }

    /// Did this design-exchange message accept the blueprint?
    ///
    /// A literal refinement-request tag is an unambiguous no and
    /// short-circuits; otherwise intent detection goes to the assessor.
    pub async fn approval_intent(&self, message: &str, context: &str) -> Result<QualityVerdict> {
        if message.contains(REFINEMENT_TAG) {
            return Ok(
                QualityVerdict::fail("explicit refinement request").with_confidence(1.0)
            );
        }
        self.assessor
            .assess(Stage::BlueprintDesign, message, context)
            .await
    }

    /// Detect whether `speaker`'s latest turn repeats a recent earlier turn.
    ///
    /// Inspects the trailing window of agent turns (orchestrator
    /// interventions are not part of the window); needs at least two turns
    /// by the speaker inside it. Returns the similarity score when it meets
    /// the threshold.
    pub fn repetition_in(&self, transcript: &[TurnMessage], speaker: Speaker) -> Option<f64> {
        let agent_turns: Vec<&TurnMessage> = transcript
            .iter()
            .filter(|t| t.speaker != Speaker::Orchestrator)
            .collect();
        let window_start = agent_turns.len().saturating_sub(REPETITION_WINDOW);
        let recent: Vec<&str> = agent_turns[window_start..]
            .iter()
            .filter(|t| t.speaker == speaker)
            .map(|t| t.content.as_str())
            .collect();
        let (latest, earlier) = recent.split_last()?;
        earlier
            .iter()
            .map(|prior| token_set_similarity(latest, prior))
            .filter(|&score| score >= self.repetition_threshold)
            .fold(None, |best: Option<f64>, score| {
                Some(best.map_or(score, |b| b.max(score)))
            })
    }
}
