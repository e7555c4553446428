//! Configuration loaded from a TOML file in the OS config directory:
//! `<config>/klangwerk/config.toml`. Every section falls back to defaults,
//! so a missing or partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library settings
    pub library: LibraryConfig,

    /// Audio output settings
    pub audio: AudioConfig,
}

/// Library settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Music library root, used when neither the command line nor
    /// $MUSICPATH provide one
    pub path: Option<PathBuf>,
}

/// Audio output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name fragment (empty = system default)
    pub output_device: String,
}

/// Full path of the config file, if a config directory exists.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("klangwerk").join("config.toml"))
}

/// Load the config file; a missing file yields the defaults.
pub fn load() -> Result<Config> {
    let Some(path) = config_path() else {
        return Ok(Config::default());
    };
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&path)?;
    toml::from_str(&text).map_err(|e| Error::config(format!("{}: {e}", path.display())))
}
