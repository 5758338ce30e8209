//! Filesystem tools: list_files, read_file, write_file, create_directory,
//! search_files
//!
//! Every path parameter goes through the [`PathGuard`] before I/O, and
//! every payload renders paths workspace-relative.

use std::sync::Arc;

use async_trait::async_trait;
use proxy_domain::{PermissionClass, ToolCall, ToolDefinition, ToolError, ToolParameter};
use regex::Regex;
use tracing::info;

use super::registry::ToolHandler;
use crate::workspace::PathGuard;

pub const LIST_FILES: &str = "list_files";
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const CREATE_DIRECTORY: &str = "create_directory";
pub const SEARCH_FILES: &str = "search_files";

/// Maximum file size to read (10 MB)
const MAX_READ_SIZE: u64 = 10 * 1024 * 1024;

/// Bounds for search_files
const MAX_SEARCH_DEPTH: usize = 8;
const MAX_SEARCH_FILES: usize = 1000;
const MAX_SEARCH_MATCHES: usize = 200;
const MAX_EXCERPT_LEN: usize = 200;

pub fn list_files_definition() -> ToolDefinition {
    ToolDefinition::new(
        LIST_FILES,
        "List the immediate entries of a directory in the workspace",
        PermissionClass::Auto,
    )
    .with_parameter(
        ToolParameter::new("directory", "Directory to list", true).with_type("path"),
    )
}

pub fn read_file_definition() -> ToolDefinition {
    ToolDefinition::new(
        READ_FILE,
        "Read the contents of a file as text",
        PermissionClass::Auto,
    )
    .with_parameter(
        ToolParameter::new("filepath", "Path to the file to read", true).with_type("path"),
    )
}

pub fn write_file_definition() -> ToolDefinition {
    ToolDefinition::new(
        WRITE_FILE,
        "Write content to a file, creating it (and parent directories) if needed, overwriting if it exists",
        PermissionClass::Auto,
    )
    .with_parameter(
        ToolParameter::new("filepath", "Path to the file to write", true).with_type("path"),
    )
    .with_parameter(ToolParameter::new("content", "Content to write", true))
}

pub fn create_directory_definition() -> ToolDefinition {
    ToolDefinition::new(
        CREATE_DIRECTORY,
        "Create a directory (and any missing parents); succeeds if it already exists",
        PermissionClass::Auto,
    )
    .with_parameter(
        ToolParameter::new("path", "Directory path to create", true).with_type("path"),
    )
}

pub fn search_files_definition() -> ToolDefinition {
    ToolDefinition::new(
        SEARCH_FILES,
        "Search file contents recursively for a pattern; returns matching paths with line excerpts",
        PermissionClass::Auto,
    )
    .with_parameter(
        ToolParameter::new("directory", "Directory to search under", true).with_type("path"),
    )
    .with_parameter(ToolParameter::new(
        "query",
        "Regex (or literal text) to search for",
        true,
    ))
}

pub struct ListFilesTool {
    guard: Arc<PathGuard>,
}

impl ListFilesTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ToolHandler for ListFilesTool {
    async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let dir_arg = call.require_string("directory").map_err(ToolError::parameter)?;
        let dir = self.guard.resolve_existing(dir_arg)?;
        if !dir.is_dir() {
            return Err(ToolError::parameter(format!("'{dir_arg}' is not a directory")));
        }

        let mut read_dir = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ToolError::execution_failed(format!("failed to list '{dir_arg}': {e}")))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| ToolError::execution_failed(format!("failed to list '{dir_arg}': {e}")))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();
        Ok(entries.join("\n"))
    }
}

pub struct ReadFileTool {
    guard: Arc<PathGuard>,
}

impl ReadFileTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let path_arg = call.require_string("filepath").map_err(ToolError::parameter)?;
        let path = self.guard.resolve_existing(path_arg)?;
        if !path.is_file() {
            return Err(ToolError::not_a_file(path_arg));
        }

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ToolError::execution_failed(format!("failed to stat '{path_arg}': {e}")))?;
        if metadata.len() > MAX_READ_SIZE {
            return Err(ToolError::parameter(format!(
                "'{path_arg}' is too large ({} bytes, limit {MAX_READ_SIZE})",
                metadata.len()
            )));
        }

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::execution_failed(format!("failed to read '{path_arg}': {e}")))
    }
}

pub struct WriteFileTool {
    guard: Arc<PathGuard>,
}

impl WriteFileTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let path_arg = call.require_string("filepath").map_err(ToolError::parameter)?;
        let content = call.require_string("content").map_err(ToolError::parameter)?;
        let path = self.guard.resolve(path_arg)?;

        if path.is_dir() {
            return Err(ToolError::not_a_file(path_arg));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::execution_failed(format!("failed to create parents of '{path_arg}': {e}"))
            })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::execution_failed(format!("failed to write '{path_arg}': {e}")))?;

        // Writes are auto-class but always leave a trace.
        info!(path = %self.guard.display(&path), bytes = content.len(), "write_file");
        Ok(format!(
            "Wrote {} bytes to {}",
            content.len(),
            self.guard.display(&path)
        ))
    }
}

pub struct CreateDirectoryTool {
    guard: Arc<PathGuard>,
}

impl CreateDirectoryTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ToolHandler for CreateDirectoryTool {
    async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let path_arg = call.require_string("path").map_err(ToolError::parameter)?;
        let path = self.guard.resolve(path_arg)?;

        if path.exists() && !path.is_dir() {
            return Err(ToolError::parameter(format!(
                "'{path_arg}' already exists and is not a directory"
            )));
        }
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            ToolError::execution_failed(format!("failed to create '{path_arg}': {e}"))
        })?;
        Ok(format!("Created directory {}", self.guard.display(&path)))
    }
}

pub struct SearchFilesTool {
    guard: Arc<PathGuard>,
}

impl SearchFilesTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ToolHandler for SearchFilesTool {
    async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let dir_arg = call.require_string("directory").map_err(ToolError::parameter)?;
        let query = call.require_string("query").map_err(ToolError::parameter)?;
        let dir = self.guard.resolve_existing(dir_arg)?;
        if !dir.is_dir() {
            return Err(ToolError::parameter(format!("'{dir_arg}' is not a directory")));
        }

        let pattern = Regex::new(query)
            .or_else(|_| Regex::new(&regex::escape(query)))
            .map_err(|e| ToolError::parameter(format!("invalid query: {e}")))?;

        let guard = self.guard.clone();
        let result = tokio::task::spawn_blocking(move || search_dir(&guard, &dir, &pattern))
            .await
            .map_err(|_| ToolError::execution_failed("search task failed"))??;
        Ok(result)
    }
}

/// Blocking recursive search, bounded by depth, file count, and match
/// count so pathological trees cannot stall the loop.
fn search_dir(
    guard: &PathGuard,
    root: &std::path::Path,
    pattern: &Regex,
) -> Result<String, ToolError> {
    let mut matches = Vec::new();
    let mut files_scanned = 0usize;
    let mut stack = vec![(root.to_path_buf(), 0usize)];

    while let Some((dir, depth)) = stack.pop() {
        if depth > MAX_SEARCH_DEPTH || matches.len() >= MAX_SEARCH_MATCHES {
            continue;
        }
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            // Only the top-level directory went through the guard; a
            // symlinked entry could point anywhere, so never follow one.
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            let path = entry.path();
            if file_type.is_dir() {
                stack.push((path, depth + 1));
                continue;
            }
            if files_scanned >= MAX_SEARCH_FILES || matches.len() >= MAX_SEARCH_MATCHES {
                break;
            }
            files_scanned += 1;
            let Ok(content) = std::fs::read_to_string(&path) else {
                // Binary or unreadable; skip.
                continue;
            };
            for (line_no, line) in content.lines().enumerate() {
                if pattern.is_match(line) {
                    let excerpt: String = line.trim().chars().take(MAX_EXCERPT_LEN).collect();
                    matches.push(format!(
                        "{}:{}: {}",
                        guard.display(&path),
                        line_no + 1,
                        excerpt
                    ));
                    if matches.len() >= MAX_SEARCH_MATCHES {
                        break;
                    }
                }
            }
        }
    }

    if matches.is_empty() {
        Ok("No matches found".to_string())
    } else {
        Ok(matches.join("\n"))
    }
}
