//! Tool registry
//!
//! Maps tool names to handlers. Registration happens once at process
//! start; a duplicate name fails fast rather than silently overriding an
//! already registered tool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use proxy_domain::{ToolCall, ToolDefinition, ToolError};
use thiserror::Error;

/// A tool implementation. Handlers return the payload text on success;
/// policy and runtime failures come back as [`ToolError`] and are turned
/// into error ToolResults by the executor.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn run(&self, call: &ToolCall) -> Result<String, ToolError>;
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Name → (definition, handler) mapping, immutable after startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails on a duplicate name.
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        if self.tools.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateTool(definition.name.clone()));
        }
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler,
            },
        );
        Ok(())
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    /// All definitions, sorted by name for deterministic advertisement.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.definition.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|t| t.handler.clone())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
