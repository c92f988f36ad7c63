//! Orchestration patterns, decisions and turn results.

use maestro_core::{MaestroError, ProgressEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How specialists are coordinated during Phase 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationPattern {
    /// Call only the first specialist.
    #[default]
    Single,
    /// Call each specialist in order, accumulating their responses.
    Sequential,
    /// Call every specialist at once with the same message.
    Concurrent,
    /// Prioritized accumulating pass followed by an evaluation loop.
    Magentic,
    /// Round-robin discussion until a termination marker or silence.
    GroupChat,
}

impl fmt::Display for OrchestrationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
            Self::Magentic => write!(f, "magentic"),
            Self::GroupChat => write!(f, "group_chat"),
        }
    }
}

impl FromStr for OrchestrationPattern {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "single" => Ok(Self::Single),
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            "magentic" => Ok(Self::Magentic),
            "group_chat" | "groupchat" => Ok(Self::GroupChat),
            other => Err(MaestroError::Config(format!(
                "Unknown orchestration pattern: {other}"
            ))),
        }
    }
}

/// Outcome of one specialist call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecialistResult {
    /// Canonical agent id.
    pub agent_id: String,
    /// Display name.
    pub agent_name: String,
    /// Reply text.
    pub response: String,
    /// Prompt tokens reported by the callee.
    pub tokens_input: u64,
    /// Completion tokens reported by the callee.
    pub tokens_output: u64,
    /// Set when the call failed; `response` is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpecialistResult {
    /// A failed call carrying only the error.
    pub fn failed(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// True when the call failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// True when the specialist produced usable text.
    pub fn has_response(&self) -> bool {
        self.error.is_none() && !self.response.is_empty()
    }

    /// Prompt plus completion tokens.
    pub fn tokens_used(&self) -> u64 {
        self.tokens_input + self.tokens_output
    }
}

/// Phase 1 branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Answer without consulting specialists.
    Direct,
    /// Hand the turn to specialists.
    Delegate,
}

/// What the orchestrator decided to do with a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDecision {
    /// Chosen branch.
    pub action: DecisionAction,
    /// Canonical specialist ids, in the order the orchestrator named them.
    #[serde(default)]
    pub specialists: Vec<String>,
    /// The orchestrator's stated rationale.
    #[serde(default)]
    pub reasoning: String,
    /// The answer itself when `action` is direct.
    #[serde(default)]
    pub direct_response: String,
}

impl AnalysisDecision {
    /// A direct answer.
    pub fn direct(reasoning: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            action: DecisionAction::Direct,
            specialists: Vec::new(),
            reasoning: reasoning.into(),
            direct_response: response.into(),
        }
    }

    /// True for the direct branch.
    pub fn is_direct(&self) -> bool {
        self.action == DecisionAction::Direct
    }
}

/// Magentic evaluation verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDecision {
    /// Whether another round should run.
    #[serde(rename = "continue", default)]
    pub should_continue: bool,
    /// The evaluator's stated rationale.
    #[serde(default)]
    pub reasoning: String,
    /// Question for the next round; blank stops the loop.
    #[serde(default)]
    pub follow_up_query: String,
    /// Canonical ids; `None` means every specialist from the last round.
    #[serde(default)]
    pub target_agents: Option<Vec<String>>,
}

impl EvaluationDecision {
    /// A verdict that ends the loop.
    pub fn stop(reasoning: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            reasoning: reasoning.into(),
            ..Self::default()
        }
    }
}

/// Action recorded in response metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    /// Answered directly.
    Direct,
    /// Delegated, then synthesized.
    DelegateAndSynthesize,
}

/// How a response was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Pattern the turn ran under.
    pub pattern: OrchestrationPattern,
    /// Branch taken by analysis.
    pub action: ResponseAction,
    /// Display names, one per specialist call, in result order.
    #[serde(default)]
    pub specialists_called: Vec<String>,
    /// Number of specialist calls.
    #[serde(default)]
    pub specialist_count: usize,
    /// Analysis rationale.
    #[serde(default)]
    pub reasoning: String,
}

/// The single terminal answer of an orchestrated turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResponse {
    /// Orchestrator id.
    pub agent_id: String,
    /// Orchestrator display name.
    pub agent_name: String,
    /// Final answer.
    pub content: String,
    /// Tokens across analysis, specialists and synthesis.
    pub tokens_used: u64,
    /// How the answer was produced.
    pub metadata: ResponseMetadata,
    /// Every progress event emitted during the turn.
    #[serde(default, rename = "chatter_events")]
    pub events: Vec<ProgressEvent>,
}

/// Why a turn ended without a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnFailure {
    /// Id of the failed turn.
    pub turn_id: Uuid,
    /// Error family, e.g. `infrastructure` or `configuration`.
    pub kind: String,
    /// Error text shown to the user.
    pub message: String,
}

/// One item of a turn stream. A stream ends with exactly one `Response` or
/// one `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", content = "data", rename_all = "snake_case")]
pub enum TurnItem {
    /// Transient execution event.
    Progress(ProgressEvent),
    /// The turn's answer.
    Response(OrchestrationResponse),
    /// The turn failed.
    Failed(TurnFailure),
}

impl TurnItem {
    /// True for `Response` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}
