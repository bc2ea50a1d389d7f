//! Orchestrator configuration — budgets, caps, and timeouts.
//!
//! Loaded and assembled externally (CLI, files, environment); the engine
//! receives it at construction and treats it as immutable for the session's
//! lifetime.

use serde::{Deserialize, Serialize};

/// Budgets and ceilings for one debug session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum conversation turns inside a single stage run.
    pub max_turns_per_stage: u32,
    /// Maximum attempts per stage visit before local retries are exhausted.
    pub max_stage_attempts: u32,
    /// Cap on the validation→diagnosis backward edge.
    pub max_diagnosis_rollbacks: u32,
    /// Cap on the stress_testing→blueprint_design backward edge.
    pub max_blueprint_rollbacks: u32,
    /// Timeout for each external capability call in milliseconds
    /// (0 = unlimited).
    pub stage_timeout_ms: u64,
    /// Global ceiling on total stage attempts across the whole session.
    pub max_stage_visits: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns_per_stage: 10,
            max_stage_attempts: 3,
            max_diagnosis_rollbacks: 2,
            max_blueprint_rollbacks: 3,
            stage_timeout_ms: 0,
            max_stage_visits: 40,
        }
    }
}
