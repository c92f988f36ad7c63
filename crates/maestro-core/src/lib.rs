//! Core types and error definitions for Maestro.
//!
//! This crate provides the foundational types shared across all Maestro
//! crates: error handling, conversation messages, tool call abstractions,
//! agent configuration, and the per-turn progress event bus.
//!
//! # Main types
//!
//! - [`MaestroError`]: Unified error enum for all Maestro subsystems.
//! - [`MaestroResult`]: Convenience alias for `Result<T, MaestroError>`.
//! - [`Message`]: A single conversation turn.
//! - [`AgentConfig`]: An orchestrator or specialist definition.
//! - [`ProgressEvent`]: A transient execution notification.
//! - [`ProgressSender`] / [`ProgressReceiver`]: The two ends of a progress bus.

/// Agent configuration types.
pub mod agent;
/// Per-turn progress event bus.
pub mod bus;
/// Error types.
pub mod error;
/// Progress event types.
pub mod event;
/// Conversation messages.
pub mod message;
/// Tool call and result types.
pub mod tool;

pub use agent::{AgentConfig, AgentKind, AgentRole};
pub use bus::{progress_bus, ProgressReceiver, ProgressSender};
pub use error::{MaestroError, MaestroResult};
pub use event::{preview, truncate_chars, ProgressEvent, ProgressKind};
pub use message::{last_user_message, Message, Role};
pub use tool::{ToolCall, ToolResult};
