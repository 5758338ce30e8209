//! Permission gate — per-invocation authorization policy
//!
//! The gate runs before every tool execution. It never executes anything
//! itself; it only decides. A `confirm-required` tool without a matching
//! confirmation token is surfaced to the model as a `PermissionRequired`
//! tool error — the proxy never executes first and asks forgiveness.

use super::entities::{PermissionClass, ToolCall, ToolDefinition};
use super::validate::validate_call;
use super::value_objects::ToolError;
use std::collections::HashSet;

/// Outcome of the permission gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// Proceed to execution.
    Allow,
    /// A confirmation token scoped to this exact call id is required
    /// before the tool may run.
    RequireConfirmation,
    /// The call is rejected outright: unknown tool or schema violation.
    /// Distinguished from `RequireConfirmation` at the error-kind level.
    Deny(ToolError),
}

/// Confirmation tokens supplied by the caller, scoped to tool-call ids.
#[derive(Debug, Clone, Default)]
pub struct Confirmations {
    confirmed_call_ids: HashSet<String>,
}

impl Confirmations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm(mut self, call_id: impl Into<String>) -> Self {
        self.confirmed_call_ids.insert(call_id.into());
        self
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.confirmed_call_ids.contains(call_id)
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            confirmed_call_ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// Decide whether a tool call may execute.
///
/// `definition` is `None` when the tool name is not registered.
/// `require_confirmation` globally enables the confirm-required policy;
/// when disabled, confirm-required tools degrade to `auto`.
pub fn authorize(
    definition: Option<&ToolDefinition>,
    call: &ToolCall,
    confirmations: &Confirmations,
    require_confirmation: bool,
) -> Authorization {
    let definition = match definition {
        Some(d) => d,
        None => {
            return Authorization::Deny(ToolError::not_found(format!("tool '{}'", call.name)));
        }
    };

    if let Err(e) = validate_call(call, definition) {
        return Authorization::Deny(e);
    }

    if require_confirmation
        && definition.permission == PermissionClass::ConfirmRequired
        && !confirmations.contains(&call.id)
    {
        return Authorization::RequireConfirmation;
    }

    Authorization::Allow
}
