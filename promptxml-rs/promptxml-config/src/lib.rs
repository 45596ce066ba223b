use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::BaseDirs;
use promptxml_document::{DEFAULT_INDENT_WIDTH, DEFAULT_SCHEMA_LOCATION, DocumentOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_DIR_NAME: &str = ".promptxml";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const MAX_INDENT_WIDTH: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    ConfigDirUnavailable,
    #[error("failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize configuration: {0}")]
    Deserialize(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("indent_width must be at most {max}, got {0}", max = MAX_INDENT_WIDTH)]
    InvalidIndentWidth(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_location: String,
    pub indent_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_location: DEFAULT_SCHEMA_LOCATION.to_string(),
            indent_width: DEFAULT_INDENT_WIDTH,
        }
    }
}

impl Config {
    /// Schema location to emit; a blank value falls back to the hosted default.
    pub fn effective_schema_location(&self) -> &str {
        let trimmed = self.schema_location.trim();
        if trimmed.is_empty() {
            DEFAULT_SCHEMA_LOCATION
        } else {
            trimmed
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indent_width > MAX_INDENT_WIDTH {
            return Err(ConfigError::InvalidIndentWidth(self.indent_width));
        }
        Ok(())
    }

    pub fn document_options(&self) -> DocumentOptions<'_> {
        DocumentOptions {
            schema_location: self.effective_schema_location(),
            indent_width: self.indent_width.min(MAX_INDENT_WIDTH),
        }
    }
}

/// Loads the promptxml configuration from disk.
///
/// A missing file yields [`Config::default`]; nothing is written.
pub fn load() -> Result<LoadOutcome, ConfigError> {
    let path = config_file_path()?;

    if !path.exists() {
        debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(LoadOutcome {
            config: Config::default(),
            path,
            from_file: false,
        });
    }

    let contents = fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    debug!(path = %path.display(), "loaded configuration");
    Ok(LoadOutcome {
        config,
        path,
        from_file: true,
    })
}

/// Persist the given configuration to disk at the provided path.
pub fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    ensure_parent_exists(path)?;
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)?;
    Ok(())
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub config: Config,
    pub path: PathBuf,
    pub from_file: bool,
}

fn ensure_parent_exists(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn config_file_path() -> Result<PathBuf, ConfigError> {
    let base_dirs = BaseDirs::new().ok_or(ConfigError::ConfigDirUnavailable)?;
    Ok(base_dirs
        .home_dir()
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}
