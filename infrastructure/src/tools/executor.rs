//! Sandboxed tool executor — the concrete [`ToolExecutorPort`].
//!
//! Wraps the registry with the runtime policy every handler shares:
//! parameter validation, a wall-clock timeout, and message sanitization.
//! All failure modes come back as error ToolResults joined to the call by
//! id; the executor never fails the request itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proxy_domain::{ToolCall, ToolDefinition, ToolError, ToolResult, validate_call};
use proxy_application::ToolExecutorPort;
use tracing::{debug, info, instrument, warn};

use super::registry::ToolRegistry;

/// Slack on top of the per-handler timeout. Handlers that enforce their
/// own deadline (run_command's group-kill) must get to finish teardown
/// before the backstop cuts them off.
const BACKSTOP_HEADROOM: Duration = Duration::from_secs(5);

/// Executes registered tools under a bounded execution context.
pub struct SandboxedExecutor {
    registry: Arc<ToolRegistry>,
    /// Wall-clock ceiling per tool call, the handler timeout plus
    /// [`BACKSTOP_HEADROOM`]. Only fires for handlers without a deadline
    /// of their own.
    timeout: Duration,
}

impl SandboxedExecutor {
    pub fn new(registry: Arc<ToolRegistry>, handler_timeout: Duration) -> Self {
        Self { registry, timeout: handler_timeout + BACKSTOP_HEADROOM }
    }
}

#[async_trait]
impl ToolExecutorPort for SandboxedExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    fn definition(&self, name: &str) -> Option<ToolDefinition> {
        self.registry.definition(name).cloned()
    }

    #[instrument(skip(self, call), fields(tool = %call.name, call_id = %call.id))]
    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let definition = match self.registry.definition(&call.name) {
            Some(d) => d,
            None => {
                return ToolResult::failure(
                    &call.id,
                    &call.name,
                    ToolError::not_found(format!("tool '{}'", call.name)),
                );
            }
        };

        if let Err(e) = validate_call(call, definition) {
            return ToolResult::failure(&call.id, &call.name, e);
        }

        // Presence checked above; the registry is immutable after startup.
        let handler = match self.registry.handler(&call.name) {
            Some(h) => h,
            None => {
                return ToolResult::failure(
                    &call.id,
                    &call.name,
                    ToolError::not_found(format!("tool '{}'", call.name)),
                );
            }
        };

        debug!("Executing tool");
        match tokio::time::timeout(self.timeout, handler.run(call)).await {
            Ok(Ok(payload)) => {
                info!(bytes = payload.len(), "Tool succeeded");
                ToolResult::ok(&call.id, &call.name, payload)
            }
            Ok(Err(e)) => {
                info!(kind = ?e.kind, "Tool failed");
                ToolResult::failure(&call.id, &call.name, e)
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Tool timed out");
                ToolResult::failure(
                    &call.id,
                    &call.name,
                    ToolError::timeout(format!(
                        "tool '{}' exceeded {} seconds",
                        call.name,
                        self.timeout.as_secs()
                    )),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::ToolHandler;
    use proxy_domain::{PermissionClass, ToolErrorKind, ToolParameter};

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
            Ok(call.require_string("text").map_err(ToolError::parameter)?.to_string())
        }
    }

    struct SleepyHandler;

    #[async_trait]
    impl ToolHandler for SleepyHandler {
        async fn run(&self, _call: &ToolCall) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    fn executor() -> SandboxedExecutor {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDefinition::new("echo", "Echo text back", PermissionClass::Auto)
                    .with_parameter(ToolParameter::new("text", "Text to echo", true)),
                Arc::new(EchoHandler),
            )
            .unwrap();
        registry
            .register(
                ToolDefinition::new("sleep", "Never returns", PermissionClass::Auto),
                Arc::new(SleepyHandler),
            )
            .unwrap();
        // Struct literal keeps the backstop tight for the timeout test.
        SandboxedExecutor { registry: Arc::new(registry), timeout: Duration::from_millis(100) }
    }

    #[tokio::test]
    async fn successful_execution_returns_ok_result() {
        let executor = executor();
        let call = ToolCall::new("echo").with_arg("text", "hello");
        let result = executor.execute(&call).await;
        assert!(result.is_ok());
        assert_eq!(result.payload.as_deref(), Some("hello"));
        assert_eq!(result.call_id, call.id);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let executor = executor();
        let call = ToolCall::new("format_disk");
        let result = executor.execute(&call).await;
        assert_eq!(result.error.unwrap().kind, ToolErrorKind::NotFound);
    }

    #[tokio::test]
    async fn missing_required_parameter_is_parameter_error() {
        let executor = executor();
        let call = ToolCall::new("echo");
        let result = executor.execute(&call).await;
        assert_eq!(result.error.unwrap().kind, ToolErrorKind::ParameterError);
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let executor = executor();
        let call = ToolCall::new("sleep");
        let result = executor.execute(&call).await;
        assert_eq!(result.error.unwrap().kind, ToolErrorKind::ExecutionTimeout);
    }

    #[test]
    fn backstop_trails_the_handler_timeout() {
        let executor =
            SandboxedExecutor::new(Arc::new(ToolRegistry::new()), Duration::from_secs(60));
        assert_eq!(executor.timeout, Duration::from_secs(60) + BACKSTOP_HEADROOM);
    }
}
