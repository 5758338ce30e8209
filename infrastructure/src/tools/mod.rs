//! Tool adapters: registry, sandboxed executor, and the built-in tools.

pub mod command;
pub mod executor;
pub mod fs;
pub mod registry;
pub mod web;

use std::sync::Arc;
use std::time::Duration;

pub use executor::SandboxedExecutor;
pub use registry::{RegistryError, ToolHandler, ToolRegistry};

use crate::workspace::PathGuard;

/// Build the registry with the full built-in tool set.
pub fn build_default_registry(
    guard: Arc<PathGuard>,
    http_client: reqwest::Client,
    command_timeout: Duration,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(
        fs::list_files_definition(),
        Arc::new(fs::ListFilesTool::new(guard.clone())),
    )?;
    registry.register(
        fs::read_file_definition(),
        Arc::new(fs::ReadFileTool::new(guard.clone())),
    )?;
    registry.register(
        fs::write_file_definition(),
        Arc::new(fs::WriteFileTool::new(guard.clone())),
    )?;
    registry.register(
        fs::create_directory_definition(),
        Arc::new(fs::CreateDirectoryTool::new(guard.clone())),
    )?;
    registry.register(
        fs::search_files_definition(),
        Arc::new(fs::SearchFilesTool::new(guard.clone())),
    )?;
    registry.register(
        command::run_command_definition(),
        Arc::new(command::RunCommandTool::new(guard, command_timeout)),
    )?;
    registry.register(
        web::search_web_definition(),
        Arc::new(web::SearchWebTool::new(http_client)),
    )?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_registry_has_all_builtins() {
        let dir = TempDir::new().unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let registry =
            build_default_registry(guard, reqwest::Client::new(), Duration::from_secs(60))
                .unwrap();
        for name in [
            "list_files",
            "read_file",
            "write_file",
            "create_directory",
            "search_files",
            "run_command",
            "search_web",
        ] {
            assert!(registry.definition(name).is_some(), "missing {name}");
        }
        assert_eq!(registry.len(), 7);
    }
}
