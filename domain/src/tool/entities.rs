//! Tool domain entities

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Permission class of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionClass {
    /// Executes without confirmation (still subject to path containment
    /// and parameter validation).
    Auto,
    /// Requires an explicit confirmation token scoped to the exact
    /// tool-call id before execution.
    ConfirmRequired,
}

impl PermissionClass {
    pub fn as_str(&self) -> &str {
        match self {
            PermissionClass::Auto => "auto",
            PermissionClass::ConfirmRequired => "confirm-required",
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        matches!(self, PermissionClass::ConfirmRequired)
    }
}

impl std::fmt::Display for PermissionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Definition of a tool the agent may invoke
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique name of the tool (e.g., "read_file")
    pub name: String,
    /// Human-readable description, surfaced to the model
    pub description: String,
    /// Permission class of this tool
    pub permission: PermissionClass,
    /// Parameter specifications
    pub parameters: Vec<ToolParameter>,
}

/// Parameter specification for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,
    /// Parameter description
    pub description: String,
    /// Whether this parameter is required
    pub required: bool,
    /// Parameter type hint ("string", "path", "number", "boolean")
    pub param_type: String,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        permission: PermissionClass,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            permission,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
            param_type: "string".to_string(),
        }
    }

    pub fn with_type(mut self, param_type: impl Into<String>) -> Self {
        self.param_type = param_type.into();
        self
    }
}

/// A call to a tool with arguments, as decoded from a model turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier unique within its parent turn. Results are joined back
    /// to calls by this id, never by position.
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// Arguments passed to the tool
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,
}

impl ToolCall {
    /// Create a call with a fresh unique id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments: HashMap::new(),
        }
    }

    /// Create a call with an explicit id (e.g. one assigned by the backend).
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: HashMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Get a string argument
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    /// Get a required string argument or return an error message
    pub fn require_string(&self, key: &str) -> Result<&str, String> {
        self.get_string(key)
            .ok_or_else(|| format!("Missing required argument: {}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_class() {
        assert!(!PermissionClass::Auto.requires_confirmation());
        assert!(PermissionClass::ConfirmRequired.requires_confirmation());
        assert_eq!(PermissionClass::ConfirmRequired.to_string(), "confirm-required");
    }

    #[test]
    fn test_tool_definition() {
        let tool = ToolDefinition::new("read_file", "Read file contents", PermissionClass::Auto)
            .with_parameter(
                ToolParameter::new("filepath", "File path to read", true).with_type("path"),
            );

        assert_eq!(tool.name, "read_file");
        assert_eq!(tool.permission, PermissionClass::Auto);
        assert_eq!(tool.parameters.len(), 1);
        assert_eq!(tool.parameters[0].param_type, "path");
    }

    #[test]
    fn test_tool_call_ids_unique() {
        let a = ToolCall::new("read_file");
        let b = ToolCall::new("read_file");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_tool_call_args() {
        let call = ToolCall::with_id("call_1", "read_file").with_arg("filepath", "/test/file.txt");

        assert_eq!(call.get_string("filepath"), Some("/test/file.txt"));
        assert_eq!(call.require_string("filepath").unwrap(), "/test/file.txt");
        assert!(call.require_string("missing").is_err());
    }
}
