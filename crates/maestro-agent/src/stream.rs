//! Streaming fragments and token accounting.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// One update fragment from a streaming model call.
///
/// Backends emit these as the model generates its response. Tool-call
/// fragments may arrive partially (missing id or name) before a complete
/// fragment carries the final arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatUpdate {
    /// A chunk of assistant text.
    TextDelta {
        /// The chunk.
        text: String,
    },

    /// A (possibly partial) tool call.
    ToolCall(ToolCallFragment),

    /// A tool's output, reported by whoever executed it.
    ToolResult(ToolResultFragment),

    /// Raw usage payload; see [`TokenUsage::from_fragment`].
    Usage {
        /// Provider payload as received.
        usage: serde_json::Value,
    },
}

impl ChatUpdate {
    /// Shorthand for a text fragment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    /// Call id; matches the eventual result.
    #[serde(default)]
    pub id: String,
    /// Tool name.
    #[serde(default)]
    pub name: String,
    /// Argument JSON: a delta while streaming, the full text once complete.
    #[serde(default)]
    pub arguments: String,
    /// Set on the fragment that carries the final arguments.
    #[serde(default)]
    pub complete: bool,
}

impl ToolCallFragment {
    /// A finished call with its full argument text.
    pub fn complete(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            complete: true,
        }
    }

    /// A streaming fragment.
    pub fn partial(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            complete: false,
        }
    }

    /// Parsed arguments when they form a JSON object.
    pub fn arguments_object(&self) -> Option<serde_json::Value> {
        serde_json::from_str::<serde_json::Value>(&self.arguments)
            .ok()
            .filter(serde_json::Value::is_object)
    }
}

/// A tool's output for one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResultFragment {
    /// Id of the call being answered.
    #[serde(default)]
    pub call_id: String,
    /// Output text, or the error message.
    #[serde(default)]
    pub content: String,
    /// True when the tool failed.
    #[serde(default)]
    pub is_error: bool,
}

/// Prompt and completion token counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input: u64,
    /// Completion tokens.
    pub output: u64,
}

/// Field-name pairs seen in the wild, tried in order.
const USAGE_SHAPES: [(&str, &str); 3] = [
    ("prompt_tokens", "completion_tokens"),
    ("input_tokens", "output_tokens"),
    ("input_token_count", "output_token_count"),
];

impl TokenUsage {
    /// Counts from explicit values.
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    /// Prompt plus completion.
    pub fn total(&self) -> u64 {
        self.input + self.output
    }

    /// True when nothing was counted.
    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    /// Extract usage from a usage fragment.
    ///
    /// The counts may sit at the top level or under `usage`, `details` or
    /// `metadata.usage`, with any of the field namings in [`USAGE_SHAPES`].
    /// The first non-zero reading wins.
    pub fn from_fragment(value: &serde_json::Value) -> Option<TokenUsage> {
        let candidates = [
            value,
            &value["usage"],
            &value["details"],
            &value["metadata"]["usage"],
            &value["metadata"],
        ];
        candidates.iter().find_map(|candidate| {
            USAGE_SHAPES.iter().find_map(|(input, output)| {
                let usage = TokenUsage {
                    input: candidate[*input].as_u64().unwrap_or(0),
                    output: candidate[*output].as_u64().unwrap_or(0),
                };
                (!usage.is_zero()).then_some(usage)
            })
        })
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
    }
}
