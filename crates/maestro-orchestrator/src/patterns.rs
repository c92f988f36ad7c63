//! Phase 2: running specialists according to an orchestration pattern.

use crate::priority::order_by_priority;
use crate::specialist::SpecialistCaller;
use crate::types::{EvaluationDecision, OrchestrationPattern, SpecialistResult};
use async_trait::async_trait;
use futures_util::future::join_all;
use maestro_core::{AgentConfig, ProgressEvent, ProgressSender};
use tracing::{debug, info};

/// Hard cap on Magentic evaluations and GroupChat rounds.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Messages that end a group chat as soon as a participant says them.
pub const TERMINATION_MARKERS: &[&str] = &["[DONE]", "[END]"];

/// Decides whether a Magentic run should go another round.
#[async_trait]
pub trait RoundEvaluator: Send + Sync {
    /// Judge whether `gathered` answers `question`; unparseable output stops.
    async fn evaluate(
        &self,
        question: &str,
        gathered: &[SpecialistResult],
        specialists: &[AgentConfig],
    ) -> EvaluationDecision;
}

/// Request-scoped inputs of one pattern run.
pub struct PatternRun<'a> {
    /// The user's message that starts the run.
    pub seed: &'a str,
    /// Caller credential, offered to local specialists only.
    pub auth_token: Option<&'a str>,
    /// Live progress sink.
    pub bus: Option<&'a ProgressSender>,
    /// Magentic round limit, including the initial pass.
    pub max_rounds: u32,
    /// Required for Magentic follow-up rounds; without it Magentic stops
    /// after the first pass.
    pub evaluator: Option<&'a dyn RoundEvaluator>,
}

/// Runs specialists under an orchestration pattern.
#[derive(Clone)]
pub struct PatternExecutor {
    caller: SpecialistCaller,
}

impl PatternExecutor {
    /// Executor issuing calls through `caller`.
    pub fn new(caller: SpecialistCaller) -> Self {
        Self { caller }
    }

    /// The underlying specialist caller.
    pub fn caller(&self) -> &SpecialistCaller {
        &self.caller
    }

    /// Run `specialists` under `pattern`. The result list follows the order
    /// in which calls were issued; for Concurrent that is input order.
    pub async fn run(
        &self,
        pattern: OrchestrationPattern,
        specialists: &[AgentConfig],
        run: PatternRun<'_>,
    ) -> Vec<SpecialistResult> {
        if specialists.is_empty() {
            return Vec::new();
        }
        info!(%pattern, count = specialists.len(), "Running specialists");
        if specialists.len() == 1 {
            return vec![self.call(&specialists[0], run.seed, &run).await];
        }
        match pattern {
            OrchestrationPattern::Single => vec![self.call(&specialists[0], run.seed, &run).await],
            OrchestrationPattern::Sequential => {
                let mut context = run.seed.to_string();
                self.accumulate(specialists, &mut context, &run).await
            }
            OrchestrationPattern::Concurrent => {
                join_all(specialists.iter().map(|a| self.call(a, run.seed, &run))).await
            }
            OrchestrationPattern::Magentic => self.magentic(specialists, &run).await,
            OrchestrationPattern::GroupChat => self.group_chat(specialists, &run).await,
        }
    }

    async fn call(
        &self,
        agent: &AgentConfig,
        message: &str,
        run: &PatternRun<'_>,
    ) -> SpecialistResult {
        self.caller.call(agent, message, run.auth_token, run.bus).await
    }

    /// One pass in order, appending each response to `context`.
    async fn accumulate(
        &self,
        specialists: &[AgentConfig],
        context: &mut String,
        run: &PatternRun<'_>,
    ) -> Vec<SpecialistResult> {
        let mut results = Vec::with_capacity(specialists.len());
        for agent in specialists {
            let result = self.call(agent, context.as_str(), run).await;
            if result.has_response() {
                context.push_str(&format!("\n\n[{} said]: {}", result.agent_name, result.response));
            }
            results.push(result);
        }
        results
    }

    async fn magentic(
        &self,
        specialists: &[AgentConfig],
        run: &PatternRun<'_>,
    ) -> Vec<SpecialistResult> {
        let ordered = order_by_priority(specialists);
        debug!(
            order = ?ordered.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            "Magentic execution order"
        );
        let mut context = run.seed.to_string();
        let mut results = self.accumulate(&ordered, &mut context, run).await;

        let Some(evaluator) = run.evaluator else {
            return results;
        };

        for round in 1..run.max_rounds {
            let evaluation = evaluator.evaluate(run.seed, &results, &ordered).await;
            debug!(
                round,
                proceed = evaluation.should_continue,
                reasoning = %evaluation.reasoning,
                "Magentic evaluation"
            );
            if !evaluation.should_continue || evaluation.follow_up_query.trim().is_empty() {
                break;
            }

            let window = results.len().saturating_sub(ordered.len());
            let recent: Vec<&str> = results[window..].iter().map(|r| r.agent_id.as_str()).collect();
            let targets: Vec<&AgentConfig> = match &evaluation.target_agents {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| ordered.iter().find(|a| &a.id == id))
                    .collect(),
                None => ordered.iter().collect(),
            };
            let eligible: Vec<&AgentConfig> = targets
                .into_iter()
                .filter(|a| recent.contains(&a.id.as_str()))
                .collect();
            if eligible.is_empty() {
                debug!(round, "No eligible follow-up targets, stopping");
                break;
            }

            if let Some(bus) = run.bus {
                bus.emit(
                    ProgressEvent::thinking(
                        "Orchestrator",
                        format!("Round {}: Following up on new information...", round + 1),
                    )
                    .with_friendly("Investigating further based on new findings"),
                );
            }

            let round_context = format!(
                "{context}\n\n[Orchestrator follow-up]: {}",
                evaluation.follow_up_query
            );
            for agent in eligible {
                let result = self.call(agent, &round_context, run).await;
                if result.has_response() {
                    context.push_str(&format!(
                        "\n\n[{} (round {})]: {}",
                        result.agent_name,
                        round + 1,
                        result.response
                    ));
                }
                results.push(result);
            }
        }
        results
    }

    async fn group_chat(
        &self,
        specialists: &[AgentConfig],
        run: &PatternRun<'_>,
    ) -> Vec<SpecialistResult> {
        let mut context = run.seed.to_string();
        let mut results = Vec::new();
        for round in 0..run.max_rounds {
            let mut round_had_output = false;
            for agent in specialists {
                let result = self.call(agent, &context, run).await;
                if result.has_response() {
                    round_had_output = true;
                    context.push_str(&format!("\n\n[{} said]: {}", result.agent_name, result.response));
                    let done = TERMINATION_MARKERS.iter().any(|m| result.response.contains(m));
                    results.push(result);
                    if done {
                        debug!(round, "Group chat terminated by marker");
                        return results;
                    }
                } else {
                    results.push(result);
                }
            }
            if !round_had_output {
                debug!(round, "Group chat round produced no output, stopping");
                break;
            }
        }
        results
    }
}
