//! Infrastructure layer for agent-proxy
//!
//! Concrete adapters behind the application-layer ports: the Ollama
//! gateway, the sandboxed tool executor, session store backends, the
//! workspace path guard, and configuration loading.

pub mod config;
pub mod ollama;
pub mod store;
pub mod tools;
pub mod workspace;

pub use config::{AppConfig, ConfigError, ConfigLoader};
pub use ollama::OllamaGateway;
pub use store::{FileSessionStore, InMemorySessionStore};
pub use tools::{SandboxedExecutor, ToolRegistry, build_default_registry};
pub use workspace::PathGuard;
