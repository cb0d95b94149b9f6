//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::env::Environment;
use crate::config::schema::Settings;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `configs/<env>_configs.toml`, relative to the working directory.
pub fn default_config_path(env: Environment) -> PathBuf {
    Path::new("configs").join(format!("{}_configs.toml", env.value()))
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(content)?;
    validate_config(&settings).map_err(ConfigError::Validation)?;
    Ok(settings)
}
