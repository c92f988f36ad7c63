//! Chat backends and the streaming agent executor for Maestro.
//!
//! # Main types
//!
//! - [`ChatBackend`]: Streams one model call as [`ChatUpdate`] fragments.
//! - [`OpenAiBackend`]: OpenAI-compatible implementation (OpenAI, Azure, OpenRouter, Groq).
//! - [`StreamingExecutor`]: Runs an agent's tool-use loop and collects progress.
//! - [`ToolProvider`]: Supplies the callable tools for an agent.
//! - [`GatedBackend`]: Caps how many model calls run at once.

pub mod backends;
pub mod config;
pub mod context;
pub mod executor;
pub mod friendly;
pub mod gate;
pub mod retry;
pub mod stream;
pub mod tool;

pub use backends::{BackendFactory, ChatBackend, ChatRequest, ChatStream, OpenAiBackend, ProviderBackendFactory};
pub use config::{LlmProvider, ModelConfig};
pub use context::{estimate_tokens, ContextWindow};
pub use executor::{AgentRun, StreamingExecutor};
pub use gate::{chat_gate, GatedBackend, DEFAULT_CHAT_CONCURRENCY};
pub use retry::{RetryPolicy, RetryingBackend};
pub use stream::{ChatUpdate, TokenUsage, ToolCallFragment, ToolResultFragment};
pub use tool::{NoTools, Tool, ToolContext, ToolDescriptor, ToolProvider};
