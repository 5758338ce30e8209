//! Tool executor port
//!
//! Defines how the application layer executes tools. The adapter owns the
//! sandbox: path containment, timeouts, output caps, and the process
//! isolation behind `run_command`.

use async_trait::async_trait;
use proxy_domain::{ToolCall, ToolDefinition, ToolResult};

/// Port for tool execution.
#[async_trait]
pub trait ToolExecutorPort: Send + Sync {
    /// Definitions of all registered tools.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Look up a tool definition by name.
    fn definition(&self, name: &str) -> Option<ToolDefinition>;

    /// Execute a tool call. Never panics and never returns early on
    /// handler failure: every outcome is a [`ToolResult`] joined to the
    /// call by id.
    async fn execute(&self, call: &ToolCall) -> ToolResult;
}
