//! Multi-agent orchestration for Maestro.
//!
//! An orchestrated turn has three phases:
//!
//! 1. **Analysis**: the orchestrator decides to answer directly or to
//!    delegate to specialists.
//! 2. **Pattern execution**: the chosen specialists run over A2A under one of
//!    the [`OrchestrationPattern`]s.
//! 3. **Synthesis**: the orchestrator merges the specialists' output.
//!
//! Progress from every phase, including events raised inside specialists,
//! streams out of [`OrchestrationEngine::execute`] as it happens.

pub mod cache;
pub mod decision;
pub mod engine;
pub mod host;
pub mod patterns;
pub mod priority;
pub mod prompts;
pub mod specialist;
pub mod tools;
pub mod types;

pub use cache::{AgentConfigCache, AgentStore, InMemoryAgentStore};
pub use engine::{EngineSettings, OrchestrationEngine, OrchestratorEvaluator, TurnRequest, TurnStream};
pub use host::LocalAgentHost;
pub use patterns::{PatternExecutor, PatternRun, RoundEvaluator};
pub use specialist::SpecialistCaller;
pub use tools::{AgentToolProvider, SpecialistTool};
pub use types::{
    AnalysisDecision, DecisionAction, EvaluationDecision, OrchestrationPattern,
    OrchestrationResponse, ResponseAction, ResponseMetadata, SpecialistResult, TurnFailure,
    TurnItem,
};
