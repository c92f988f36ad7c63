//! Magentic ordering: research-style agents first, data agents next.

use maestro_core::AgentConfig;

const RESEARCH_KEYWORDS: &[&str] = &[
    "investigat",
    "research",
    "search",
    "find",
    "discover",
    "rag",
    "document",
];
const DATA_KEYWORDS: &[&str] = &["adx", "kusto", "database", "sql", "query", "data"];

/// Magentic scheduling tier; lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PriorityTier {
    /// Research and retrieval agents.
    Research,
    /// Data and query agents.
    Data,
    /// Everything else.
    Other,
}

/// Classify by keyword match on name and description, case-insensitive.
pub fn tier(agent: &AgentConfig) -> PriorityTier {
    let haystack = format!("{} {}", agent.name, agent.description).to_lowercase();
    if RESEARCH_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        PriorityTier::Research
    } else if DATA_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        PriorityTier::Data
    } else {
        PriorityTier::Other
    }
}

/// Stable sort by tier; ties keep their input order.
pub fn order_by_priority(agents: &[AgentConfig]) -> Vec<AgentConfig> {
    let mut ordered = agents.to_vec();
    ordered.sort_by_key(tier);
    ordered
}
