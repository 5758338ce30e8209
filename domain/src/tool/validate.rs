//! Parameter validation against a tool's declared schema

use super::entities::{ToolCall, ToolDefinition};
use super::value_objects::ToolError;

/// Validate a call's arguments against the definition's parameter schema.
///
/// Checks that every required parameter is present and that supplied
/// values match their declared type hint. Unknown extra arguments are
/// tolerated — models frequently add them and rejecting the whole call
/// would be worse than ignoring the extras.
pub fn validate_call(call: &ToolCall, definition: &ToolDefinition) -> Result<(), ToolError> {
    for param in &definition.parameters {
        let value = match call.arguments.get(&param.name) {
            Some(v) => v,
            None => {
                if param.required {
                    return Err(ToolError::parameter(format!(
                        "Missing required parameter '{}' for tool '{}'",
                        param.name, definition.name
                    )));
                }
                continue;
            }
        };

        let type_ok = match param.param_type.as_str() {
            "string" | "path" => value.is_string(),
            "number" | "integer" => value.is_i64() || value.is_u64() || value.is_f64(),
            "boolean" => value.is_boolean(),
            _ => true,
        };

        if !type_ok {
            return Err(ToolError::parameter(format!(
                "Parameter '{}' of tool '{}' must be of type {}",
                param.name, definition.name, param.param_type
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::entities::{PermissionClass, ToolParameter};
    use crate::tool::value_objects::ToolErrorKind;

    fn read_file_def() -> ToolDefinition {
        ToolDefinition::new("read_file", "Read a file", PermissionClass::Auto).with_parameter(
            ToolParameter::new("filepath", "Path to read", true).with_type("path"),
        )
    }

    #[test]
    fn test_validate_ok() {
        let call = ToolCall::new("read_file").with_arg("filepath", "a.txt");
        assert!(validate_call(&call, &read_file_def()).is_ok());
    }

    #[test]
    fn test_validate_missing_required() {
        let call = ToolCall::new("read_file");
        let err = validate_call(&call, &read_file_def()).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::ParameterError);
        assert!(err.message.contains("filepath"));
    }

    #[test]
    fn test_validate_type_mismatch() {
        let call = ToolCall::new("read_file").with_arg("filepath", 42);
        let err = validate_call(&call, &read_file_def()).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::ParameterError);
    }

    #[test]
    fn test_validate_optional_absent() {
        let def = read_file_def().with_parameter(
            ToolParameter::new("limit", "Max lines", false).with_type("number"),
        );
        let call = ToolCall::new("read_file").with_arg("filepath", "a.txt");
        assert!(validate_call(&call, &def).is_ok());
    }

    #[test]
    fn test_validate_tolerates_extra_args() {
        let call = ToolCall::new("read_file")
            .with_arg("filepath", "a.txt")
            .with_arg("unexpected", "value");
        assert!(validate_call(&call, &read_file_def()).is_ok());
    }
}
