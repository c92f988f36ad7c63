use std::fmt::Display;

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

/// Top-level error type shared by every Maestro crate.
///
/// The first four variants form the orchestration failure taxonomy. Only
/// [`MaestroError::Configuration`] and [`MaestroError::Infrastructure`] ever
/// abort a turn; specialist and decision-parse failures are recovered where
/// they happen.
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    /// Missing orchestrator, ambiguous orchestrator, or an agent without a model.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The chat backend could not be reached at all.
    #[error("Infrastructure error [{correlation_id}]: {message}")]
    Infrastructure {
        /// Identifier of the turn (or request) that hit the fault.
        correlation_id: String,
        /// Human-readable description.
        message: String,
    },

    /// A specialist RPC, tool or upstream failure.
    #[error("Specialist call error: {0}")]
    SpecialistCall(String),

    /// Analysis or evaluation output could not be parsed.
    #[error("Decision parse error: {0}")]
    DecisionParse(String),

    /// An error originating from an agent execution loop.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error from the inbound A2A server layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// An error in configuration file parsing.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MaestroError {
    /// Wrap any error as an infrastructure fault tagged with a correlation id.
    pub fn infrastructure(correlation_id: impl Display, message: impl Display) -> Self {
        Self::Infrastructure {
            correlation_id: correlation_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Stable snake_case name of the error family, used on the turn stream.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Infrastructure { .. } => "infrastructure",
            Self::SpecialistCall(_) => "specialist_call",
            Self::DecisionParse(_) => "decision_parse",
            Self::Agent(_) => "agent",
            Self::Http(_) => "http",
            Self::Gateway(_) => "gateway",
            Self::Config(_) => "config",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
        }
    }

    /// Whether this error aborts an orchestrated turn.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SpecialistCall(_) | Self::DecisionParse(_))
    }
}
