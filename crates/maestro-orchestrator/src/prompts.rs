//! Default prompt templates and the blocks substituted into them.
//!
//! Administrators may override the analysis and synthesis templates per
//! orchestrator; the placeholders below are replaced verbatim.

use crate::types::SpecialistResult;
use maestro_core::AgentConfig;

/// Placeholder for the specialist catalog in analysis and evaluation prompts.
pub const AGENT_LIST: &str = "{agent_list}";
/// Placeholder for specialist output in the synthesis prompt.
pub const SPECIALIST_RESPONSES: &str = "{specialist_responses}";
/// Placeholder for the user's question in the evaluation prompt.
pub const USER_QUESTION: &str = "{user_question}";
/// Placeholder for gathered answers in the evaluation prompt.
pub const GATHERED_INFO: &str = "{gathered_info}";

/// User turn sent alongside the evaluation prompt.
pub const EVALUATION_REQUEST: &str =
    "Should we continue investigating or do we have enough information?";

/// Analysis template: route the request or answer it directly.
pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"You route user requests for a team of specialist agents.

For every request, decide whether you can answer it yourself or whether one or
more specialists should handle it.

=== SPECIALISTS ===
{agent_list}
===================

Reply with a JSON decision block first.

To delegate:
```json
{
  "action": "delegate",
  "specialists": ["agent_id"],
  "reasoning": "why these specialists"
}
```

To answer yourself:
```json
{
  "action": "direct",
  "reasoning": "why no specialist is needed"
}
```
When answering yourself, write the answer after the block.

Guidelines:
1. Delegate whenever a request falls inside a specialist's domain.
2. Several specialists may be named when a request spans domains.
3. If unsure whether a specialist can help, delegate.
4. Greetings, small talk and general knowledge are answered directly.
"#;

/// Synthesis template: merge specialist answers into one reply.
pub const DEFAULT_SYNTHESIS_PROMPT: &str = r#"You combine the work of specialist agents into one answer for the user.

=== SPECIALIST OUTPUT ===
{specialist_responses}
=========================

Guidelines:
1. Merge overlapping findings instead of repeating them.
2. Point out conflicting findings.
3. When a specialist failed, say which one and what went wrong, and suggest a next step.
4. Present the findings directly, without phrases like "the agent reported".
5. Use markdown for lists and tables when it helps.

Write the final answer now.
"#;

/// Evaluation template: decide whether Magentic needs another round.
pub const DEFAULT_EVALUATION_PROMPT: &str = r#"Decide whether the specialists have gathered enough to answer the user.

QUESTION:
{user_question}

GATHERED SO FAR:
{gathered_info}

SPECIALISTS:
{agent_list}

Continue only when the findings name something new (a person, company,
record, dataset) that another specialist could look up, and that lookup has
not been done yet. Stop when nothing new turned up or the answer is complete.

Reply with JSON:
```json
{
  "continue": true,
  "reasoning": "short explanation",
  "follow_up_query": "the next question to ask",
  "target_agents": ["agent_id"]
}
```
"#;

/// Appended to a local specialist's system prompt.
pub const EXECUTION_DIRECTIVE: &str = "\n\n=== EXECUTION ===\n\
- Act on the request immediately using your tools.\n\
- Never ask for clarification; make a reasonable assumption and proceed.\n\
- Report what you found, or exactly what failed.";

/// Instructions for a local agent that has no system prompt of its own.
pub const DEFAULT_AGENT_INSTRUCTIONS: &str = "You are a helpful assistant.";

/// Catalog lines `- name (id: id): description`.
pub fn agent_catalog(specialists: &[AgentConfig], empty: &str) -> String {
    if specialists.is_empty() {
        return empty.to_string();
    }
    specialists
        .iter()
        .map(|a| format!("- {} (id: {}): {}", a.name, a.id, a.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Analysis instructions with the specialist catalog filled in.
pub fn analysis_prompt(orchestrator: &AgentConfig, specialists: &[AgentConfig]) -> String {
    let template = orchestrator
        .analysis_prompt
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_ANALYSIS_PROMPT);
    template.replace(AGENT_LIST, &agent_catalog(specialists, "No specialists available"))
}

/// Per-specialist sections for synthesis, in result order.
pub fn synthesis_block(results: &[SpecialistResult]) -> String {
    results
        .iter()
        .map(|r| match &r.error {
            Some(error) => format!("=== {} ===\n[ERROR: {error}]", r.agent_name),
            None => format!("=== {} ===\n{}", r.agent_name, r.response),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Synthesis instructions with specialist responses filled in.
pub fn synthesis_prompt(orchestrator: &AgentConfig, results: &[SpecialistResult]) -> String {
    let template = orchestrator
        .synthesis_prompt
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_SYNTHESIS_PROMPT);
    template.replace(SPECIALIST_RESPONSES, &synthesis_block(results))
}

/// `[name]: response` lines for every result that produced text.
pub fn gathered_info(results: &[SpecialistResult]) -> String {
    let parts: Vec<String> = results
        .iter()
        .filter(|r| r.has_response())
        .map(|r| format!("[{}]: {}", r.agent_name, r.response))
        .collect();
    if parts.is_empty() {
        "No information gathered yet.".to_string()
    } else {
        parts.join("\n\n")
    }
}

/// Evaluation instructions for a Magentic round.
pub fn evaluation_prompt(
    question: &str,
    results: &[SpecialistResult],
    specialists: &[AgentConfig],
) -> String {
    DEFAULT_EVALUATION_PROMPT
        .replace(USER_QUESTION, question)
        .replace(GATHERED_INFO, &gathered_info(results))
        .replace(AGENT_LIST, &agent_catalog(specialists, "No specialists"))
}

/// System instructions for a locally hosted agent run.
pub fn agent_instructions(agent: &AgentConfig) -> String {
    let base = agent
        .system_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_AGENT_INSTRUCTIONS);
    if agent.is_orchestrator() {
        base.to_string()
    } else {
        format!("{base}{EXECUTION_DIRECTIVE}")
    }
}
