//! Parsing of the orchestrator's structured decisions.
//!
//! The model is asked for a fenced ```json block; a bare object carrying the
//! expected key is accepted as a fallback. Anything unparseable degrades to
//! the safe branch: a direct answer for analysis, loop termination for
//! evaluation.

use crate::types::{AnalysisDecision, DecisionAction, EvaluationDecision};
use maestro_core::AgentConfig;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, warn};

#[allow(clippy::expect_used)]
static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n?(.*?)\n?```").expect("valid fenced pattern"));
#[allow(clippy::expect_used)]
static BARE_ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{[^{}]*"action"[^{}]*\}"#).expect("valid action pattern"));
#[allow(clippy::expect_used)]
static BARE_CONTINUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{[^{}]*"continue"[^{}]*\}"#).expect("valid continue pattern"));

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    action: String,
    #[serde(default)]
    specialists: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    #[serde(rename = "continue", default)]
    should_continue: bool,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    follow_up_query: Option<String>,
    #[serde(default)]
    target_agents: Option<Vec<String>>,
}

/// A decoded block plus the byte offset where the matched text ends.
struct Extracted<T> {
    value: T,
    end: usize,
}

fn extract<T: DeserializeOwned>(
    raw: &str,
    bare: &Regex,
) -> Option<Extracted<T>> {
    let fenced = FENCED_JSON.captures(raw);
    let (json, end) = if let Some(caps) = fenced {
        let whole = caps.get(0)?;
        (caps.get(1)?.as_str(), whole.end())
    } else {
        let found = bare.find(raw)?;
        (found.as_str(), found.end())
    };
    match serde_json::from_str(json) {
        Ok(value) => Some(Extracted { value, end }),
        Err(e) => {
            warn!(error = %e, "Decision block is not valid JSON");
            None
        }
    }
}

/// Reference keys in lookup order: lowercase name then id, per specialist.
fn reference_keys(specialists: &[AgentConfig]) -> Vec<(String, &str)> {
    specialists
        .iter()
        .flat_map(|a| [(a.name.to_lowercase(), a.id.as_str()), (a.id.clone(), a.id.as_str())])
        .collect()
}

fn exact_match<'a>(keys: &[(String, &'a str)], reference: &str) -> Option<&'a str> {
    let lower = reference.to_lowercase();
    keys.iter()
        .find(|(k, _)| *k == lower)
        .or_else(|| keys.iter().find(|(k, _)| k == reference))
        .map(|(_, id)| *id)
}

fn substring_match<'a>(keys: &[(String, &'a str)], reference: &str) -> Option<&'a str> {
    let lower = reference.to_lowercase();
    if lower.is_empty() {
        return None;
    }
    keys.iter()
        .find(|(k, _)| !k.is_empty() && (lower.contains(k.as_str()) || k.contains(&lower)))
        .map(|(_, id)| *id)
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

/// Map free-form references (names or ids, any case) to canonical ids.
///
/// Exact matches win; otherwise the first key that contains, or is contained
/// in, the reference. Unmatched references are dropped.
pub fn normalize_references(references: &[String], specialists: &[AgentConfig]) -> Vec<String> {
    let keys = reference_keys(specialists);
    let mut ids = Vec::new();
    for reference in references {
        match exact_match(&keys, reference).or_else(|| substring_match(&keys, reference)) {
            Some(id) => push_unique(&mut ids, id),
            None => debug!(reference = %reference, "Specialist reference did not match"),
        }
    }
    ids
}

/// Parse Phase 1 output into a decision over `specialists`.
pub fn parse_analysis(raw: &str, specialists: &[AgentConfig]) -> AnalysisDecision {
    let Some(Extracted { value, end }) = extract::<RawAnalysis>(raw, &BARE_ACTION) else {
        debug!("No analysis decision found, answering directly");
        return AnalysisDecision::direct("Could not parse decision", raw);
    };

    match value.action.trim().to_lowercase().as_str() {
        "direct" => {
            let after = raw[end..].trim();
            let response = if after.is_empty() { raw } else { after };
            AnalysisDecision::direct(value.reasoning, response)
        }
        "delegate" => {
            let ids = normalize_references(&value.specialists, specialists);
            if ids.is_empty() {
                warn!(
                    requested = ?value.specialists,
                    "No requested specialist matched, answering directly"
                );
                return AnalysisDecision::direct(value.reasoning, raw);
            }
            AnalysisDecision {
                action: DecisionAction::Delegate,
                specialists: ids,
                reasoning: value.reasoning,
                direct_response: String::new(),
            }
        }
        other => {
            warn!(action = %other, "Unknown decision action, answering directly");
            AnalysisDecision::direct("Could not parse decision", raw)
        }
    }
}

/// Parse a Magentic evaluation. Target agents are matched exactly (name or
/// id, case-insensitive); no substring fallback.
pub fn parse_evaluation(raw: &str, specialists: &[AgentConfig]) -> EvaluationDecision {
    let Some(Extracted { value, .. }) = extract::<RawEvaluation>(raw, &BARE_CONTINUE) else {
        return EvaluationDecision::stop("Could not parse evaluation");
    };
    let keys = reference_keys(specialists);
    let target_agents = value.target_agents.map(|targets| {
        let mut ids = Vec::new();
        for target in &targets {
            if let Some(id) = exact_match(&keys, target) {
                push_unique(&mut ids, id);
            }
        }
        ids
    });
    EvaluationDecision {
        should_continue: value.should_continue,
        reasoning: value.reasoning,
        follow_up_query: value.follow_up_query.unwrap_or_default(),
        target_agents,
    }
}
