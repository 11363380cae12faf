//! `formsheet.toml` loading.

use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use formsheet_core::EngineConfig;

use crate::error::{CliError, Result};
use crate::logging::{LogFormat, LogLevel};

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

/// Default config location, e.g. `~/.config/formsheet/formsheet.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "formsheet")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("formsheet.toml");
    Some(path)
}

/// Load the config file.
///
/// An explicit path must exist. A missing default file yields defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::ConfigNotFound(path.to_path_buf()));
            }
            path.to_path_buf()
        }
        None => match user_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(AppConfig::default()),
        },
    };
    read_config(&path)
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let meta = std::fs::metadata(path)?;
    if meta.len() > MAX_CONFIG_FILE_BYTES {
        return Err(CliError::ConfigTooLarge {
            path: path.to_path_buf(),
            size: meta.len(),
            max: MAX_CONFIG_FILE_BYTES,
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content).map_err(|message| CliError::Config {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_config(content: &str) -> std::result::Result<AppConfig, String> {
    toml::from_str(content).map_err(|err| err.to_string())
}
