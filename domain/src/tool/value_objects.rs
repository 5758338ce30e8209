//! Tool value objects — immutable result and error types
//!
//! Every tool execution produces a [`ToolResult`] joined back to its
//! originating call by id. Tool errors are recoverable at the loop level:
//! they are appended as `tool` messages and the model decides whether to
//! retry, work around, or explain the failure.

use serde::{Deserialize, Serialize};

/// Closed set of tool failure kinds.
///
/// | Kind | Meaning |
/// |------|---------|
/// | `ParameterError` | Missing required argument or type mismatch |
/// | `NotFound` | File, directory, or tool does not exist |
/// | `NotAFile` | Path exists but is not a regular file |
/// | `WorkspaceViolation` | Path resolves outside the workspace root |
/// | `PermissionRequired` | Confirm-required tool invoked without a confirmation token |
/// | `ExecutionTimeout` | Handler exceeded its wall-clock limit |
/// | `ExecutionFailed` | Handler-internal fault (sanitized message) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolErrorKind {
    ParameterError,
    NotFound,
    NotAFile,
    WorkspaceViolation,
    PermissionRequired,
    ExecutionTimeout,
    ExecutionFailed,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::ParameterError => "ParameterError",
            ToolErrorKind::NotFound => "NotFound",
            ToolErrorKind::NotAFile => "NotAFile",
            ToolErrorKind::WorkspaceViolation => "WorkspaceViolation",
            ToolErrorKind::PermissionRequired => "PermissionRequired",
            ToolErrorKind::ExecutionTimeout => "ExecutionTimeout",
            ToolErrorKind::ExecutionFailed => "ExecutionFailed",
        }
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error that occurred during tool authorization or execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    /// Human-readable message. Must not leak host paths outside the
    /// workspace or internal stack detail.
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parameter(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ParameterError, message)
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ToolErrorKind::NotFound,
            format!("Not found: {}", resource.into()),
        )
    }

    pub fn not_a_file(resource: impl Into<String>) -> Self {
        Self::new(
            ToolErrorKind::NotAFile,
            format!("Not a regular file: {}", resource.into()),
        )
    }

    pub fn workspace_violation(path: impl Into<String>) -> Self {
        Self::new(
            ToolErrorKind::WorkspaceViolation,
            format!("Path escapes the workspace root: {}", path.into()),
        )
    }

    pub fn permission_required(tool: impl Into<String>) -> Self {
        Self::new(
            ToolErrorKind::PermissionRequired,
            format!(
                "Tool '{}' requires explicit confirmation before execution",
                tool.into()
            ),
        )
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ExecutionTimeout, message)
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ExecutionFailed, message)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

/// Result of a tool execution, joined to its call by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the ToolCall this result answers
    pub call_id: String,
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Output payload (for successful execution)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Error information (for failed execution)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResult {
    pub fn ok(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            payload: Some(payload.into()),
            error: None,
        }
    }

    pub fn failure(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: ToolError,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            payload: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Serialize into the text body of a `tool` message, in the shape the
    /// model sees: `{"status":"ok","payload":...}` or
    /// `{"status":"error","error_kind":...,"message":...}`.
    pub fn to_message_content(&self) -> String {
        let value = match &self.error {
            None => serde_json::json!({
                "status": "ok",
                "payload": self.payload.as_deref().unwrap_or(""),
            }),
            Some(err) => serde_json::json!({
                "status": "error",
                "error_kind": err.kind.as_str(),
                "message": err.message,
            }),
        };
        value.to_string()
    }
}
