//! The two-phase orchestration engine.
//!
//! A turn runs Analysis on the orchestrator, optionally runs specialists
//! under a pattern, and finishes with Synthesis. Everything observable is
//! pushed onto a [`TurnStream`] that ends with exactly one
//! [`TurnItem::Response`] or [`TurnItem::Failed`].

use crate::cache::AgentConfigCache;
use crate::decision::{parse_analysis, parse_evaluation};
use crate::patterns::{PatternExecutor, PatternRun, RoundEvaluator, DEFAULT_MAX_ROUNDS};
use crate::prompts::{analysis_prompt, evaluation_prompt, synthesis_prompt, EVALUATION_REQUEST};
use crate::types::{
    AnalysisDecision, EvaluationDecision, OrchestrationPattern, OrchestrationResponse,
    ResponseAction, ResponseMetadata, SpecialistResult, TurnFailure, TurnItem,
};
use async_trait::async_trait;
use maestro_agent::executor::DEFAULT_POLL_INTERVAL;
use maestro_agent::{AgentRun, BackendFactory, ChatBackend, ContextWindow, StreamingExecutor};
use maestro_core::{
    last_user_message, progress_bus, AgentConfig, MaestroError, MaestroResult, Message,
    ProgressEvent, Role,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Items of one orchestrated turn.
pub type TurnStream = ReceiverStream<TurnItem>;

const TURN_CHANNEL_CAPACITY: usize = 64;

/// Engine-wide knobs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Default cap on Magentic evaluations and GroupChat rounds.
    pub max_rounds: u32,
    /// How many recent turns Analysis sees.
    pub history_window: usize,
    /// Wait per bus poll while specialists run.
    pub poll_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            history_window: 20,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One orchestrated turn as requested by a caller.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// How specialists are coordinated.
    pub pattern: OrchestrationPattern,
    /// Orchestrator plus participating specialists, in caller order.
    pub agent_ids: Vec<String>,
    /// Conversation so far; the last user turn is the request.
    pub turns: Vec<Message>,
    /// Forwarded to every specialist call.
    pub auth_token: Option<String>,
    /// Overrides [`EngineSettings::max_rounds`].
    pub max_rounds: Option<u32>,
}

impl TurnRequest {
    /// A request with no credential and the engine's round limit.
    pub fn new(pattern: OrchestrationPattern, agent_ids: Vec<String>, turns: Vec<Message>) -> Self {
        Self {
            pattern,
            agent_ids,
            turns,
            auth_token: None,
            max_rounds: None,
        }
    }

    /// Bearer credential for the caller's own installation.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Round limit for this turn only.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }
}

/// Validated inputs of a turn, moved into the driving task.
struct Turn {
    id: Uuid,
    request: TurnRequest,
    orchestrator: AgentConfig,
    specialists: Vec<AgentConfig>,
    backend: Arc<dyn ChatBackend>,
}

/// Collects every event of a turn and forwards it to the stream.
struct TurnEvents {
    tx: mpsc::Sender<TurnItem>,
    seen: Vec<ProgressEvent>,
}

impl TurnEvents {
    async fn emit(&mut self, event: ProgressEvent) {
        self.seen.push(event.clone());
        if self.tx.send(TurnItem::Progress(event)).await.is_err() {
            debug!("Turn stream consumer dropped");
        }
    }

    async fn emit_all(&mut self, events: Vec<ProgressEvent>) {
        for event in events {
            self.emit(event).await;
        }
    }

    async fn finish(self, item: TurnItem) {
        if self.tx.send(item).await.is_err() {
            debug!("Turn stream consumer dropped before the final item");
        }
    }
}

/// Runs orchestrated turns. Cheap to clone.
#[derive(Clone)]
pub struct OrchestrationEngine {
    cache: Arc<AgentConfigCache>,
    backends: Arc<dyn BackendFactory>,
    patterns: PatternExecutor,
    settings: EngineSettings,
}

impl OrchestrationEngine {
    /// Engine reading agents from `cache` and running specialists through `patterns`.
    pub fn new(
        cache: Arc<AgentConfigCache>,
        backends: Arc<dyn BackendFactory>,
        patterns: PatternExecutor,
    ) -> Self {
        Self {
            cache,
            backends,
            patterns,
            settings: EngineSettings::default(),
        }
    }

    /// Replace the defaults.
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The agent configuration cache, for refreshes.
    pub fn cache(&self) -> &Arc<AgentConfigCache> {
        &self.cache
    }

    /// Validate the request and start the turn.
    ///
    /// Configuration problems (no orchestrator, more than one, an agent
    /// without a model) are returned here, before any model or specialist is
    /// contacted. Later failures arrive as [`TurnItem::Failed`].
    pub async fn execute(&self, request: TurnRequest) -> MaestroResult<TurnStream> {
        let turn_id = Uuid::new_v4();
        let agents = self.cache.resolve_many(&request.agent_ids).await?;
        let (mut orchestrators, specialists): (Vec<_>, Vec<_>) =
            agents.into_iter().partition(AgentConfig::is_orchestrator);

        let orchestrator = match orchestrators.len() {
            0 => {
                return Err(MaestroError::Configuration(
                    "An orchestrator agent is required for orchestrated chat.".into(),
                ))
            }
            1 => orchestrators.remove(0),
            n => {
                return Err(MaestroError::Configuration(format!(
                    "Exactly one orchestrator agent is allowed per turn, got {n}."
                )))
            }
        };
        orchestrator.model_ref()?;
        for specialist in specialists.iter().filter(|s| s.is_local()) {
            specialist.model_ref()?;
        }
        let backend = self.backends.backend_for(&orchestrator)?;

        info!(
            turn_id = %turn_id,
            pattern = %request.pattern,
            orchestrator = %orchestrator.name,
            specialists = specialists.len(),
            "Starting orchestrated turn"
        );

        let (tx, rx) = mpsc::channel(TURN_CHANNEL_CAPACITY);
        let turn = Turn {
            id: turn_id,
            request,
            orchestrator,
            specialists,
            backend,
        };
        let engine = self.clone();
        tokio::spawn(
            async move { engine.drive(turn, tx).await }
                .instrument(info_span!("turn", turn_id = %turn_id)),
        );
        Ok(ReceiverStream::new(rx))
    }

    async fn drive(self, turn: Turn, tx: mpsc::Sender<TurnItem>) {
        let mut events = TurnEvents {
            tx,
            seen: Vec::new(),
        };
        let started = Instant::now();
        let item = match self.run_turn(&turn, &mut events).await {
            Ok(mut response) => {
                info!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    tokens = response.tokens_used,
                    "Turn complete"
                );
                response.events = std::mem::take(&mut events.seen);
                TurnItem::Response(response)
            }
            Err(e) => {
                error!(error = %e, "Turn failed");
                TurnItem::Failed(TurnFailure {
                    turn_id: turn.id,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                })
            }
        };
        events.finish(item).await;
    }

    async fn run_turn(
        &self,
        turn: &Turn,
        events: &mut TurnEvents,
    ) -> MaestroResult<OrchestrationResponse> {
        let orchestrator = &turn.orchestrator;
        let request = &turn.request;

        // Phase 1
        events
            .emit(
                ProgressEvent::thinking(&orchestrator.name, "Analyzing request...")
                    .with_friendly("Determining how to handle your request"),
            )
            .await;
        let window = ContextWindow::from_history(&request.turns, self.settings.history_window);
        let prompt = analysis_prompt(orchestrator, &turn.specialists);
        let analysis = self
            .complete(turn, &prompt, window.messages())
            .await?;
        events.emit_all(analysis.events).await;

        let decision = parse_analysis(&analysis.text, &turn.specialists);
        info!(
            action = ?decision.action,
            specialists = ?decision.specialists,
            reasoning = %decision.reasoning,
            "Analysis decided"
        );
        let analysis_tokens = analysis.usage.total();

        if decision.is_direct() {
            return Ok(self.direct_response(turn, decision, analysis_tokens));
        }

        // Phase 2
        let participants = self.participants(turn, &decision);
        events
            .emit(
                ProgressEvent::thinking(
                    &orchestrator.name,
                    format!("Coordinating specialists using {} pattern...", request.pattern),
                )
                .with_friendly(format!("Coordinating {} specialist(s)", participants.len())),
            )
            .await;
        let results = self.run_pattern(turn, &participants, events).await;

        // Phase 3
        events
            .emit(
                ProgressEvent::thinking(&orchestrator.name, "Synthesizing specialist responses...")
                    .with_friendly("Combining results into final answer"),
            )
            .await;
        let user_turns: Vec<Message> = request
            .turns
            .iter()
            .filter(|m| m.role == Role::User)
            .cloned()
            .collect();
        let user_window = ContextWindow::from_history(&user_turns, self.settings.history_window);
        let synthesis = self
            .complete(turn, &synthesis_prompt(orchestrator, &results), user_window.messages())
            .await?;
        events.emit_all(synthesis.events).await;

        let specialist_tokens: u64 = results.iter().map(SpecialistResult::tokens_used).sum();
        Ok(OrchestrationResponse {
            agent_id: orchestrator.id.clone(),
            agent_name: orchestrator.name.clone(),
            content: synthesis.text,
            tokens_used: analysis_tokens + specialist_tokens + synthesis.usage.total(),
            metadata: ResponseMetadata {
                pattern: request.pattern,
                action: ResponseAction::DelegateAndSynthesize,
                specialists_called: results.iter().map(|r| r.agent_name.clone()).collect(),
                specialist_count: results.len(),
                reasoning: decision.reasoning,
            },
            events: Vec::new(),
        })
    }

    /// A no-tools orchestrator call. Backend failures abort the turn.
    async fn complete(
        &self,
        turn: &Turn,
        instructions: &str,
        messages: &[Message],
    ) -> MaestroResult<AgentRun> {
        StreamingExecutor::new(turn.backend.clone(), &turn.orchestrator.name)
            .with_poll_interval(self.settings.poll_interval)
            .run(Some(instructions), messages, None)
            .await
            .map_err(|e| escalate(turn.id, e))
    }

    fn direct_response(
        &self,
        turn: &Turn,
        decision: AnalysisDecision,
        tokens_used: u64,
    ) -> OrchestrationResponse {
        OrchestrationResponse {
            agent_id: turn.orchestrator.id.clone(),
            agent_name: turn.orchestrator.name.clone(),
            content: decision.direct_response,
            tokens_used,
            metadata: ResponseMetadata {
                pattern: turn.request.pattern,
                action: ResponseAction::Direct,
                specialists_called: Vec::new(),
                specialist_count: 0,
                reasoning: decision.reasoning,
            },
            events: Vec::new(),
        }
    }

    /// Magentic always runs the full specialist set; other patterns run the
    /// ids Analysis chose, in its order.
    fn participants(&self, turn: &Turn, decision: &AnalysisDecision) -> Vec<AgentConfig> {
        if turn.request.pattern == OrchestrationPattern::Magentic {
            return turn.specialists.clone();
        }
        decision
            .specialists
            .iter()
            .filter_map(|id| turn.specialists.iter().find(|s| &s.id == id))
            .cloned()
            .collect()
    }

    /// Run the pattern while relaying specialist events as they arrive.
    async fn run_pattern(
        &self,
        turn: &Turn,
        participants: &[AgentConfig],
        events: &mut TurnEvents,
    ) -> Vec<SpecialistResult> {
        let (sender, mut bus) = progress_bus();
        let evaluator = OrchestratorEvaluator {
            backend: turn.backend.clone(),
            orchestrator: turn.orchestrator.clone(),
            poll_interval: self.settings.poll_interval,
        };
        let seed = last_user_message(&turn.request.turns);
        let run = PatternRun {
            seed,
            auth_token: turn.request.auth_token.as_deref(),
            bus: Some(&sender),
            max_rounds: turn.request.max_rounds.unwrap_or(self.settings.max_rounds),
            evaluator: Some(&evaluator),
        };

        let pattern = self.patterns.run(turn.request.pattern, participants, run);
        tokio::pin!(pattern);
        let results = loop {
            tokio::select! {
                results = &mut pattern => break results,
                event = bus.poll(self.settings.poll_interval) => {
                    if let Some(event) = event {
                        events.emit(event).await;
                    }
                }
            }
        };
        events.emit_all(bus.drain()).await;

        let failed = results.iter().filter(|r| r.is_error()).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "Some specialists failed");
        }
        results
    }
}

/// Keeps configuration errors as they are; anything else from the backend
/// becomes an infrastructure fault tagged with the turn id.
fn escalate(turn_id: Uuid, err: MaestroError) -> MaestroError {
    match err {
        MaestroError::Configuration(_) | MaestroError::Infrastructure { .. } => err,
        other => MaestroError::infrastructure(turn_id, other),
    }
}

/// Asks the orchestrator whether a Magentic run needs another round.
pub struct OrchestratorEvaluator {
    backend: Arc<dyn ChatBackend>,
    orchestrator: AgentConfig,
    poll_interval: Duration,
}

impl OrchestratorEvaluator {
    /// Evaluator using the orchestrator's own model.
    pub fn new(backend: Arc<dyn ChatBackend>, orchestrator: AgentConfig) -> Self {
        Self {
            backend,
            orchestrator,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[async_trait]
impl RoundEvaluator for OrchestratorEvaluator {
    async fn evaluate(
        &self,
        question: &str,
        gathered: &[SpecialistResult],
        specialists: &[AgentConfig],
    ) -> EvaluationDecision {
        let prompt = evaluation_prompt(question, gathered, specialists);
        let run = StreamingExecutor::new(self.backend.clone(), &self.orchestrator.name)
            .with_poll_interval(self.poll_interval)
            .run(Some(&prompt), &[Message::user(EVALUATION_REQUEST)], None)
            .await;
        match run {
            Ok(run) => parse_evaluation(&run.text, specialists),
            Err(e) => {
                warn!(error = %e, "Evaluation call failed, stopping");
                EvaluationDecision::stop(format!("Evaluation failed: {e}"))
            }
        }
    }
}
