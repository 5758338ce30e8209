//! Configuration loader with multi-source merging.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use thiserror::Error;

use super::sections::AppConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

/// Loads configuration by merging, lowest priority first:
/// built-in defaults → `agent-proxy.toml` / `.agent-proxy.toml` in the
/// working directory (or an explicit path) → `AGENT_PROXY_*` environment
/// variables (`AGENT_PROXY_BACKEND__BASE_URL` style nesting).
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(config_path: Option<&PathBuf>) -> Result<AppConfig, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        match config_path {
            Some(path) => {
                figment = figment.merge(Toml::file(path));
            }
            None => {
                for filename in &["agent-proxy.toml", ".agent-proxy.toml"] {
                    if Path::new(filename).exists() {
                        figment = figment.merge(Toml::file(filename));
                        break;
                    }
                }
            }
        }

        figment = figment.merge(Env::prefixed("AGENT_PROXY_").split("__"));

        figment.extract().map_err(|e| ConfigError::Invalid(Box::new(e)))
    }

    /// Built-in defaults only (tests, `--no-config`).
    pub fn load_defaults() -> AppConfig {
        AppConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load_without_any_file() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(config.session.expiry_secs, 3600);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[backend]\nbase_url = \"http://10.0.0.5:11434\"\n\n[limits]\nmax_tool_turns = 3"
        )
        .unwrap();

        let config = ConfigLoader::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.backend.base_url, "http://10.0.0.5:11434");
        assert_eq!(config.limits.max_tool_turns, 3);
        // Untouched sections keep their defaults.
        assert_eq!(config.server.port, 11223);
    }
}
