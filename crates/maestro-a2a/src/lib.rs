//! Agent-to-Agent (A2A) protocol support for Maestro.
//!
//! Specialists are always invoked over A2A, whether they run in this
//! installation or elsewhere: the [`A2aClient`] issues JSON-RPC
//! `message/send` calls, and the [`A2aServer`] exposes local agents through
//! the same wire format together with agent-card discovery.

pub mod client;
pub mod middleware;
pub mod protocol;
pub mod server;

pub use client::{A2aCallOutcome, A2aClient, A2aTransport, DEFAULT_CALL_TIMEOUT};
pub use middleware::AuthConfig;
pub use protocol::{AgentCard, AgentDirectory, JsonRpcRequest, JsonRpcResponse};
pub use server::{A2aAgentHandler, A2aServer, LocalExecution};
