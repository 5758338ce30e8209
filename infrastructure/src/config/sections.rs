//! Raw configuration data types
//!
//! These structs mirror the TOML config file structure exactly. Every
//! field has a default so a missing file or a partial file always yields
//! a runnable configuration.

use serde::{Deserialize, Serialize};

/// Complete proxy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub workspace: WorkspaceConfig,
    pub session: SessionConfig,
    pub limits: LimitsConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 11223,
        }
    }
}

/// Backend model server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Models the proxy accepts. Empty means accept anything the
    /// backend advertises.
    pub supported_models: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            supported_models: Vec::new(),
            request_timeout_secs: 120,
        }
    }
}

/// Workspace sandbox settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: "/tmp/agent_workspace".to_string(),
        }
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Spool directory for the file-backed store. Empty means keep
    /// sessions in memory only.
    pub store_dir: String,
    pub expiry_secs: u64,
    pub context_max_tokens: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_dir: String::new(),
            expiry_secs: 3600,
            context_max_tokens: 4096,
        }
    }
}

/// Loop and tool execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_tool_turns: u32,
    pub tool_timeout_secs: u64,
    /// Requests allowed per interval, 0 disables rate limiting.
    pub rate_limit_per_minute: u32,
    pub require_confirmation: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tool_turns: 10,
            tool_timeout_secs: 60,
            rate_limit_per_minute: 60,
            require_confirmation: true,
        }
    }
}
