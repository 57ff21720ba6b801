//! Config file loader.

use super::{DeployConfig, EnvOverrides};
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";

/// Load config from a TOML file.
pub fn load_config_from_file(path: &Path) -> Result<DeployConfig, ConfigError> {
    validate_config_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::MissingFile(path.to_path_buf())
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let config: DeployConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::Malformed(format!("{}: {}", path.display(), e)))?;

    Ok(config)
}

/// Build the effective configuration: defaults, then file, then environment.
///
/// An explicit `path` must exist. Without one, `deploy.toml` in the working
/// directory is used when present and built-in defaults otherwise.
pub fn load_config(path: Option<&Path>, env: &EnvOverrides) -> Result<DeployConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            log::info!("[Config] Loading settings from {}", path.display());
            load_config_from_file(path)?
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                log::info!("[Config] Loading settings from {}", default_path.display());
                load_config_from_file(&default_path)?
            } else {
                log::info!("[Config] No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                DeployConfig::default()
            }
        }
    };

    config.apply_env(env);
    config.validate()?;
    Ok(config)
}

/// Validate config path (.toml extension required).
pub fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Malformed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "toml" => Ok(()),
        Some(ext) => Err(ConfigError::Malformed(format!(
            "Configuration file must have .toml extension, got .{}",
            ext.to_string_lossy()
        ))),
        None => Err(ConfigError::Malformed(
            "Configuration file must have .toml extension".to_string(),
        )),
    }
}
