//! Progress events: transient execution notifications streamed to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Kind of a [`ProgressEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// Internal reasoning or phase marker.
    Thinking,
    /// A tool is being invoked.
    ToolCall,
    /// A tool returned.
    ToolResult,
    /// Work handed to another agent.
    Delegation,
    /// Content produced or a call completed.
    Content,
}

/// One real-time execution notification.
///
/// Serialized form doubles as the `chatter_events` entries carried in A2A
/// result metadata, so absent fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    /// Display name of the agent the event belongs to.
    #[serde(default)]
    pub agent_name: String,
    /// Human-oriented content.
    #[serde(default)]
    pub content: String,
    /// Tool name (or call id for tool results).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool arguments as reported by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<serde_json::Value>,
    /// Elapsed time in milliseconds.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "round_duration"
    )]
    pub duration_ms: Option<f64>,
    /// Prompt tokens, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_input: Option<u64>,
    /// Completion tokens, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_output: Option<u64>,
    /// Short explanation for non-technical readers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_message: Option<String>,
    /// Emission time. Reads RFC 3339 strings or epoch seconds.
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

fn round_duration<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(ms) => serializer.serialize_f64((ms * 10.0).round() / 10.0),
        None => serializer.serialize_none(),
    }
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&value).unwrap_or_else(Utc::now))
}

fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        serde_json::Value::Number(secs) => {
            let millis = (secs.as_f64()? * 1000.0).round();
            DateTime::<Utc>::from_timestamp_millis(millis as i64)
        }
        _ => None,
    }
}

impl ProgressEvent {
    /// A bare event of the given kind.
    pub fn new(kind: ProgressKind, agent_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            agent_name: agent_name.into(),
            content: content.into(),
            tool_name: None,
            tool_args: None,
            duration_ms: None,
            tokens_input: None,
            tokens_output: None,
            friendly_message: None,
            timestamp: Utc::now(),
        }
    }

    /// A [`ProgressKind::Thinking`] event.
    pub fn thinking(agent_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(ProgressKind::Thinking, agent_name, content)
    }

    /// A [`ProgressKind::Delegation`] event.
    pub fn delegation(agent_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(ProgressKind::Delegation, agent_name, content)
    }

    /// A [`ProgressKind::Content`] event.
    pub fn content(agent_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(ProgressKind::Content, agent_name, content)
    }

    /// Attach a tool name and optional arguments.
    pub fn with_tool(mut self, name: impl Into<String>, args: Option<serde_json::Value>) -> Self {
        self.tool_name = Some(name.into());
        self.tool_args = args;
        self
    }

    /// Attach a duration.
    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach token counts.
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }

    /// Attach a friendly message.
    pub fn with_friendly(mut self, message: impl Into<String>) -> Self {
        self.friendly_message = Some(message.into());
        self
    }

    /// Re-attribute a nested event to the agent that relayed it.
    pub fn retagged(mut self, agent_name: &str) -> Self {
        self.agent_name = agent_name.to_string();
        self
    }
}

/// Cut `text` to at most `max` characters, appending `...` when shortened.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Cut `text` to at most `max` characters without a marker.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
