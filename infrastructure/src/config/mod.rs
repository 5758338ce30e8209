//! Configuration loading.

mod loader;
mod sections;

pub use loader::{ConfigError, ConfigLoader};
pub use sections::{
    AppConfig, BackendConfig, LimitsConfig, ServerConfig, SessionConfig, WorkspaceConfig,
};
