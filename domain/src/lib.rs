//! Domain layer for agent-proxy
//!
//! This crate contains the core data model and policy logic of the proxy:
//! conversation messages and sessions, tool definitions and results, the
//! permission gate, context-window trimming, and the agent loop state
//! machine. It has no dependencies on infrastructure or HTTP concerns.
//!
//! # Core Concepts
//!
//! ## Agent Loop
//!
//! One client request drives a repeated model→tool→model cycle. The model
//! may answer with tool calls; the proxy executes them inside the
//! workspace sandbox and feeds the results back until the model produces
//! a plain answer or the turn limit is reached.
//!
//! ## Permission Classes
//!
//! Every tool carries a [`PermissionClass`]: `auto` tools run without
//! ceremony, `confirm-required` tools (command execution) need an explicit
//! confirmation token scoped to the exact tool call.

pub mod agent;
pub mod context;
pub mod core;
pub mod session;
pub mod tool;

// Re-export commonly used types
pub use agent::loop_state::{AgentLoopState, LoopPhase, TerminationReason};
pub use context::trimming::{ContextBudget, estimate_tokens, trim_history};
pub use core::error::ProxyError;
pub use session::entities::{Message, Role, Session};
pub use tool::{
    entities::{PermissionClass, ToolCall, ToolDefinition, ToolParameter},
    permission::{Authorization, Confirmations, authorize},
    validate::validate_call,
    value_objects::{ToolError, ToolErrorKind, ToolResult},
};
