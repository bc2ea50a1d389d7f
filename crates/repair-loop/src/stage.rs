//! Debug pipeline stages — identifiers, the transition graph, and guards.
//!
//! The pipeline is a fixed five-stage chain with exactly two backward edges:
//!
//! ```text
//! Diagnosis → BlueprintDesign → StressTesting → Implementation → Validation
//!                  ↑                  │                               │
//!                  └──────────────────┘                               │
//!                  ↑ (stress failure)                                 │
//! Diagnosis ←──────┴──────────────────────────────────────────────────┘
//!                  (validation failure)
//! ```
//!
//! Every transition the orchestrator performs is checked against this graph
//! so an illegal edge is a typed error, never silent state corruption.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One stage of the debug pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Root-cause analysis of the reported defect.
    Diagnosis,
    /// Iterative design exchange producing an agreed fix blueprint.
    BlueprintDesign,
    /// Adversarial edge-case probing of the agreed blueprint.
    StressTesting,
    /// Translation of the blueprint into a concrete code unit.
    Implementation,
    /// Direct execution of the candidate code against the test cases.
    Validation,
}

impl Stage {
    /// All stages in forward order.
    pub const ALL: [Stage; 5] = [
        Stage::Diagnosis,
        Stage::BlueprintDesign,
        Stage::StressTesting,
        Stage::Implementation,
        Stage::Validation,
    ];

    /// The next stage on the forward path, or `None` for `Validation`.
    pub fn forward_next(self) -> Option<Stage> {
        match self {
            Self::Diagnosis => Some(Self::BlueprintDesign),
            Self::BlueprintDesign => Some(Self::StressTesting),
            Self::StressTesting => Some(Self::Implementation),
            Self::Implementation => Some(Self::Validation),
            Self::Validation => None,
        }
    }

    /// Where a failure at this stage rolls back to, if the stage has a
    /// backward edge at all.
    ///
    /// Only two edges exist: a stress-testing failure invalidates the agreed
    /// design, and a validation failure invalidates the whole analysis.
    pub fn rollback_target(self) -> Option<Stage> {
        match self {
            Self::StressTesting => Some(Self::BlueprintDesign),
            Self::Validation => Some(Self::Diagnosis),
            _ => None,
        }
    }

    /// Whether a failure here can unwind already-accepted upstream work.
    pub fn is_rollback_eligible(self) -> bool {
        self.rollback_target().is_some()
    }

    /// Whether the orchestrator consults the quality gate after this stage.
    ///
    /// `Validation` has no gate — its pass/fail comes straight from code
    /// execution.
    pub fn has_gate(self) -> bool {
        !matches!(self, Self::Validation)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Diagnosis => write!(f, "diagnosis"),
            Self::BlueprintDesign => write!(f, "blueprint_design"),
            Self::StressTesting => write!(f, "stress_testing"),
            Self::Implementation => write!(f, "implementation"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// Whether `from → to` is an edge of the declared stage graph.
///
/// Legal edges are the four forward edges plus the two rollback edges;
/// nothing else, including self-loops (a local retry re-enters the same
/// stage without a transition).
pub fn is_legal_transition(from: Stage, to: Stage) -> bool {
    from.forward_next() == Some(to) || from.rollback_target() == Some(to)
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal stage transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: Stage,
    pub to: Stage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_chain_covers_all_stages() {
        let mut stage = Stage::Diagnosis;
        let mut visited = vec![stage];
        while let Some(next) = stage.forward_next() {
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited, Stage::ALL);
    }

    #[test]
    fn test_rollback_targets() {
        assert_eq!(
            Stage::StressTesting.rollback_target(),
            Some(Stage::BlueprintDesign)
        );
        assert_eq!(Stage::Validation.rollback_target(), Some(Stage::Diagnosis));
        assert_eq!(Stage::Diagnosis.rollback_target(), None);
        assert_eq!(Stage::BlueprintDesign.rollback_target(), None);
        assert_eq!(Stage::Implementation.rollback_target(), None);
    }

    #[test]
    fn test_only_declared_edges_are_legal() {
        let legal: Vec<(Stage, Stage)> = Stage::ALL
            .iter()
            .flat_map(|&from| Stage::ALL.iter().map(move |&to| (from, to)))
            .filter(|&(from, to)| is_legal_transition(from, to))
            .collect();

        assert_eq!(
            legal,
            vec![
                (Stage::Diagnosis, Stage::BlueprintDesign),
                (Stage::BlueprintDesign, Stage::StressTesting),
                (Stage::StressTesting, Stage::BlueprintDesign),
                (Stage::StressTesting, Stage::Implementation),
                (Stage::Implementation, Stage::Validation),
                (Stage::Validation, Stage::Diagnosis),
            ]
        );
    }

    #[test]
    fn test_no_self_loops() {
        for stage in Stage::ALL {
            assert!(!is_legal_transition(stage, stage));
        }
    }

    #[test]
    fn test_rollback_eligibility() {
        assert!(Stage::StressTesting.is_rollback_eligible());
        assert!(Stage::Validation.is_rollback_eligible());
        assert!(!Stage::Diagnosis.is_rollback_eligible());
        assert!(!Stage::BlueprintDesign.is_rollback_eligible());
        assert!(!Stage::Implementation.is_rollback_eligible());
    }

    #[test]
    fn test_gate_coverage() {
        assert!(Stage::Diagnosis.has_gate());
        assert!(Stage::BlueprintDesign.has_gate());
        assert!(Stage::StressTesting.has_gate());
        assert!(Stage::Implementation.has_gate());
        assert!(!Stage::Validation.has_gate());
    }

    #[test]
    fn test_display() {
        assert_eq!(Stage::Diagnosis.to_string(), "diagnosis");
        assert_eq!(Stage::BlueprintDesign.to_string(), "blueprint_design");
        assert_eq!(Stage::StressTesting.to_string(), "stress_testing");
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Stage::StressTesting).unwrap();
        assert_eq!(json, "\"stress_testing\"");
        let parsed: Stage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Stage::StressTesting);
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = IllegalTransition {
            from: Stage::Diagnosis,
            to: Stage::Validation,
        };
        assert_eq!(
            err.to_string(),
            "illegal stage transition: diagnosis → validation"
        );
    }
}
