//! Configuration for the reaction tools.

use crate::{ConfigError, ConfigResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Reaction hub endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:8002/hub";

const LOG_LEVEL_ENV: &str = "REACTION_LOG_LEVEL";
const ENDPOINT_URL_ENV: &str = "REACTION_ENDPOINT_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Reaction hub endpoint.
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    /// Default for targets that do not say whether to reload on attach.
    #[serde(default)]
    pub snapshot_on_start: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            endpoint_url: default_endpoint_url(),
            snapshot_on_start: false,
        }
    }
}

impl Config {
    /// Loads `config.json` from `paths`, falling back to defaults, then
    /// applies environment overrides.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        tracing::debug!(
            path = %config_path.display(),
            endpoint = %config.endpoint_url,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Empty values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v: &String| !v.trim().is_empty());

        if let Some(log_level) = non_empty(LOG_LEVEL_ENV) {
            self.log_level = log_level;
        }
        if let Some(endpoint_url) = non_empty(ENDPOINT_URL_ENV) {
            self.endpoint_url = endpoint_url;
        }
    }

    /// The endpoint as a parsed URL.
    pub fn endpoint_url(&self) -> ConfigResult<Url> {
        Url::parse(&self.endpoint_url).map_err(ConfigError::from)
    }
}
