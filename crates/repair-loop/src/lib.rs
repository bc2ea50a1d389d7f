//! Repair Loop — state-machine orchestration for multi-agent debug sessions.
//!
//! This library coordinates a five-stage debugging workflow between two
//! reasoning agents (a solution agent and a code agent) and a controlling
//! orchestrator:
//!
//! ```text
//! Diagnosis → BlueprintDesign → StressTesting → Implementation → Validation
//!                  ↑                  │                               │
//!                  └──── stress failure                               │
//! Diagnosis ←──────────────────────────────── validation failure ─────┘
//! ```
//!
//! The crate is the orchestration engine only. The agents' prompting
//! strategies, the LLM transport, and the sandboxed code runner are external
//! collaborators injected through the capability traits in [`capability`] —
//! substitute deterministic fakes for all of them and the whole state
//! machine runs offline.
//!
//! # Usage
//!
//! ```rust,ignore
//! use repair_loop::{Capabilities, Orchestrator, ProblemSpec, TestCase};
//!
//! let orchestrator = Orchestrator::new(Capabilities {
//!     solution: solution_agent,
//!     code: code_agent,
//!     assessor: quality_model,
//!     executor: sandbox,
//! });
//!
//! let outcome = orchestrator
//!     .debug_problem(
//!         ProblemSpec::new(description, test_cases)
//!             .with_current_code(buggy_code)
//!             .with_error_logs(logs),
//!     )
//!     .await;
//!
//! if outcome.success {
//!     println!("{}", outcome.final_code.unwrap());
//! }
//! ```

pub mod artifact;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod orchestrator;
pub mod rollback;
pub mod stage;
mod stages;

pub use artifact::{EdgeCaseProbe, StageArtifact, StressReport};
pub use capability::{
    AgentRole, Capabilities, CaseResult, CodeExecutor, ExecutionReport, QualityAssessor,
    ReasoningAgent, Speaker, TurnMessage,
};
pub use config::OrchestratorConfig;
pub use context::{
    CarriedContext, FailureNote, ProblemSpec, SessionOutcome, SessionState, TestCase,
};
pub use error::{FailureClass, FailureDisposition};
pub use gate::{QualityGate, QualityVerdict, Verdict};
pub use ledger::{
    replay, AttemptOutcome, ExecutionSummary, Ledger, ReplayReport, ReplayedOutcome, StageAttempt,
    TransitionRecord,
};
pub use orchestrator::{DebugOutcome, Orchestrator};
pub use rollback::RollbackEdge;
pub use stage::{is_legal_transition, IllegalTransition, Stage};
