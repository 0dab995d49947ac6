//! File system locations under `~/.reaction-stream`.

use crate::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

const BASE_DIR_NAME: &str = ".reaction-stream";
const LOG_FILE_NAME: &str = "reaction.jsonl";

#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
    /// Set when the config file was named explicitly.
    config_file: Option<PathBuf>,
}

impl Paths {
    /// Uses `~/.reaction-stream`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;

        Ok(Self::with_base_dir(home.join(BASE_DIR_NAME)))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            config_file: None,
        }
    }

    /// Paths for an explicitly named config file, whatever its file name.
    ///
    /// Logs live next to it, under the directory that contains it.
    pub fn for_config_file(config_file: &Path) -> Self {
        let base_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            base_dir,
            config_file: Some(config_file.to_path_buf()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The explicit config file, else `<base>/config.json`.
    pub fn config_file(&self) -> PathBuf {
        match &self.config_file {
            Some(path) => path.clone(),
            None => self.base_dir.join("config.json"),
        }
    }

    /// `<base>/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// `<base>/logs/reaction.jsonl`
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
