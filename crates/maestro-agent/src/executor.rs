//! Single-agent streaming executor.
//!
//! Drives one agent's tool-use loop over a [`ChatBackend`]. While a model
//! call or a tool invocation is outstanding, the executor also polls the
//! progress bus so events from nested specialist calls surface as they
//! happen. Fragment noise is deduplicated, usage is accumulated, and the
//! final text is returned together with every event observed.

use crate::backends::{ChatBackend, ChatRequest};
use crate::context::{estimate_tokens, joined_content};
use crate::friendly::{describe_tool_call, summarize_result};
use crate::stream::{ChatUpdate, TokenUsage, ToolCallFragment, ToolResultFragment};
use crate::tool::Tool;
use futures_util::future::join_all;
use maestro_core::{
    truncate_chars, MaestroResult, Message, ProgressEvent, ProgressKind, ProgressReceiver, ToolCall,
    ToolResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long a single bus poll waits before checking the model stream again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

const RESULT_PREVIEW_CHARS: usize = 500;

/// Outcome of one executor run.
#[derive(Debug, Clone, Default)]
pub struct AgentRun {
    /// Concatenated assistant text.
    pub text: String,
    /// Every progress event observed, in delivery order.
    pub events: Vec<ProgressEvent>,
    /// Summed over every model call in the run.
    pub usage: TokenUsage,
    /// Set when no usage fragment was ever seen and counts were estimated.
    pub tokens_estimated: bool,
    /// Wall-clock time of the whole run.
    pub duration_ms: f64,
}

impl AgentRun {
    /// Prompt plus completion tokens.
    pub fn tokens_used(&self) -> u64 {
        self.usage.total()
    }
}

/// Drives one agent through the model stream and its tool calls.
///
/// Nested progress from tools is interleaved with the model's own fragments
/// so callers see events in the order they happened.
pub struct StreamingExecutor {
    backend: Arc<dyn ChatBackend>,
    agent_name: String,
    tools: Vec<Arc<dyn Tool>>,
    delegation_targets: HashSet<String>,
    poll_interval: Duration,
    max_turns: u32,
}

impl StreamingExecutor {
    /// Executor with no tools and the default polling and turn limits.
    pub fn new(backend: Arc<dyn ChatBackend>, agent_name: impl Into<String>) -> Self {
        Self {
            backend,
            agent_name: agent_name.into(),
            tools: Vec::new(),
            delegation_targets: HashSet::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_turns: 20,
        }
    }

    /// Tools the model may call.
    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    /// Agent names whose tool calls are reported as delegations.
    pub fn with_delegation_targets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.delegation_targets = names
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .collect();
        self
    }

    /// How often the nested bus is polled while a tool runs.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Cap on model calls per run; at least one.
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Run the tool-use loop to completion.
    ///
    /// `bus` is the receiving end of the bus that this run's tools report on.
    /// Backend failures are returned as errors; tool failures become error
    /// results fed back to the model.
    pub async fn run(
        &self,
        instructions: Option<&str>,
        turns: &[Message],
        mut bus: Option<&mut ProgressReceiver>,
    ) -> MaestroResult<AgentRun> {
        let started = Instant::now();
        let mut tracker = FragmentTracker::new(&self.agent_name, &self.delegation_targets);
        let mut conversation = turns.to_vec();
        let descriptors: Vec<_> = self.tools.iter().map(|t| t.descriptor().clone()).collect();

        for turn in 0..self.max_turns {
            let request = ChatRequest::new(instructions.map(str::to_string), conversation.clone())
                .with_tools(descriptors.clone());
            let mut updates = self.backend.stream(&request).await?;
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut turn_text = String::new();

            loop {
                let next = match bus.as_deref_mut() {
                    Some(rx) => tokio::select! {
                        update = updates.recv() => Next::Update(update),
                        event = rx.poll(self.poll_interval) => Next::Bus(event),
                    },
                    None => Next::Update(updates.recv().await),
                };
                match next {
                    Next::Bus(Some(event)) => tracker.push(event),
                    Next::Bus(None) => {}
                    Next::Update(None) => break,
                    Next::Update(Some(Err(e))) => return Err(e),
                    Next::Update(Some(Ok(update))) => {
                        if let ChatUpdate::TextDelta { text } = &update {
                            turn_text.push_str(text);
                        }
                        if let Some(call) = tracker.observe(update) {
                            calls.push(call);
                        }
                    }
                }
            }

            if calls.is_empty() {
                debug!(agent = %self.agent_name, turn, "Model turn finished without tool calls");
                break;
            }

            info!(agent = %self.agent_name, turn, count = calls.len(), "Invoking tools");
            let invocation = self.invoke_all(&calls);
            tokio::pin!(invocation);
            let results = match bus.as_deref_mut() {
                Some(rx) => loop {
                    tokio::select! {
                        results = &mut invocation => break results,
                        event = rx.poll(self.poll_interval) => {
                            if let Some(event) = event {
                                tracker.push(event);
                            }
                        }
                    }
                },
                None => invocation.await,
            };

            let summary: Vec<String> = calls
                .iter()
                .map(|c| format!("{}({})", c.name, c.arguments))
                .collect();
            let assistant = if turn_text.is_empty() {
                format!("[tool calls] {}", summary.join(", "))
            } else {
                format!("{turn_text}\n[tool calls] {}", summary.join(", "))
            };
            conversation.push(Message::assistant(assistant));

            for result in results {
                tracker.observe(ChatUpdate::ToolResult(ToolResultFragment {
                    call_id: result.call_id.clone(),
                    content: result.content.clone(),
                    is_error: result.is_error,
                }));
                let backfill = serde_json::json!({
                    "type": "tool_result",
                    "tool_call_id": result.call_id,
                    "content": result.content,
                    "is_error": result.is_error,
                });
                conversation.push(Message::tool(backfill.to_string()));
            }

            if turn + 1 == self.max_turns {
                warn!(agent = %self.agent_name, "Tool loop hit max turns");
            }
        }

        if let Some(rx) = bus {
            for event in rx.drain() {
                tracker.push(event);
            }
        }

        let mut run = tracker.finish(turns);
        run.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        Ok(run)
    }

    async fn invoke_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.invoke(call.clone()))).await
    }

    async fn invoke(&self, call: ToolCall) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|t| t.descriptor().name == call.name) else {
            warn!(tool = %call.name, "Model called an unknown tool");
            return ToolResult::error(&call.id, format!("Unknown tool: {}", call.name));
        };
        let call_id = call.id.clone();
        match tool.invoke(call).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Tool invocation failed");
                ToolResult::error(call_id, format!("Tool error: {e}"))
            }
        }
    }
}

enum Next {
    Update(Option<MaestroResult<ChatUpdate>>),
    Bus(Option<ProgressEvent>),
}

/// Turns raw fragments into deduplicated progress events.
struct FragmentTracker<'a> {
    agent_name: &'a str,
    delegation_targets: &'a HashSet<String>,
    text: String,
    events: Vec<ProgressEvent>,
    first_seen: HashMap<String, Instant>,
    call_names: HashMap<String, String>,
    reported_calls: HashSet<String>,
    returned_calls: HashSet<String>,
    reported_results: HashSet<String>,
    usage: TokenUsage,
    usage_seen: bool,
}

impl<'a> FragmentTracker<'a> {
    fn new(agent_name: &'a str, delegation_targets: &'a HashSet<String>) -> Self {
        Self {
            agent_name,
            delegation_targets,
            text: String::new(),
            events: Vec::new(),
            first_seen: HashMap::new(),
            call_names: HashMap::new(),
            reported_calls: HashSet::new(),
            returned_calls: HashSet::new(),
            reported_results: HashSet::new(),
            usage: TokenUsage::default(),
            usage_seen: false,
        }
    }

    fn push(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }

    /// Record one fragment; returns a tool call once it is complete.
    fn observe(&mut self, update: ChatUpdate) -> Option<ToolCall> {
        match update {
            ChatUpdate::TextDelta { text } => {
                self.text.push_str(&text);
                None
            }
            ChatUpdate::ToolCall(fragment) => self.observe_call(fragment),
            ChatUpdate::ToolResult(fragment) => {
                self.observe_result(fragment);
                None
            }
            ChatUpdate::Usage { usage } => {
                if let Some(reading) = TokenUsage::from_fragment(&usage) {
                    self.usage += reading;
                    self.usage_seen = true;
                    self.push(
                        ProgressEvent::thinking(
                            self.agent_name,
                            format!(
                                "LLM call: {} input, {} output tokens",
                                reading.input, reading.output
                            ),
                        )
                        .with_tokens(reading.input, reading.output),
                    );
                }
                None
            }
        }
    }

    fn observe_call(&mut self, fragment: ToolCallFragment) -> Option<ToolCall> {
        if fragment.id.is_empty() {
            return None;
        }
        self.first_seen
            .entry(fragment.id.clone())
            .or_insert_with(Instant::now);
        if fragment.name.is_empty() {
            return None;
        }
        self.call_names
            .entry(fragment.id.clone())
            .or_insert_with(|| fragment.name.clone());

        let args = fragment.arguments_object();
        if self.reported_calls.insert(fragment.id.clone()) {
            let event = if self.is_delegation(&fragment.name) {
                ProgressEvent::delegation(self.agent_name, format!("Delegating to {}", fragment.name))
                    .with_tool(&fragment.name, Some(args.clone().unwrap_or_else(|| serde_json::json!({}))))
            } else {
                ProgressEvent::new(
                    ProgressKind::ToolCall,
                    self.agent_name,
                    format!("Calling {}", fragment.name),
                )
                .with_tool(&fragment.name, args.clone())
                .with_friendly(describe_tool_call(&fragment.name, args.as_ref()))
            };
            self.push(event);
        }

        if fragment.complete && self.returned_calls.insert(fragment.id.clone()) {
            return Some(ToolCall {
                id: fragment.id,
                name: fragment.name,
                arguments: args.unwrap_or_else(|| serde_json::json!({})),
            });
        }
        None
    }

    fn observe_result(&mut self, fragment: ToolResultFragment) {
        if fragment.call_id.is_empty() || !self.reported_results.insert(fragment.call_id.clone()) {
            return;
        }
        let duration = self
            .first_seen
            .remove(&fragment.call_id)
            .map(|start| start.elapsed().as_secs_f64() * 1000.0);
        let content = truncate_chars(&fragment.content, RESULT_PREVIEW_CHARS).to_string();
        let friendly = if fragment.is_error {
            "Tool reported an error".to_string()
        } else {
            summarize_result(&fragment.content)
        };

        let mut event = ProgressEvent::new(ProgressKind::ToolResult, self.agent_name, content)
            .with_tool(&fragment.call_id, None)
            .with_friendly(friendly);
        if let Some(ms) = duration {
            event = event.with_duration(ms);
        }
        if let Some(name) = self.call_names.get(&fragment.call_id) {
            debug!(tool = %name, call_id = %fragment.call_id, "Tool result observed");
        }
        self.push(event);
    }

    fn is_delegation(&self, tool_name: &str) -> bool {
        self.delegation_targets
            .contains(&tool_name.replace('_', " ").to_lowercase())
    }

    /// Close out the run; without any usage reading, both sides are estimated
    /// from character counts of the input turns and the produced text.
    fn finish(self, turns: &[Message]) -> AgentRun {
        let (usage, tokens_estimated) = if self.usage_seen {
            (self.usage, false)
        } else {
            let estimate = TokenUsage::new(
                estimate_tokens(&joined_content(turns)),
                estimate_tokens(&self.text),
            );
            (estimate, true)
        };
        AgentRun {
            text: self.text,
            events: self.events,
            usage,
            tokens_estimated,
            duration_ms: 0.0,
        }
    }
}
