// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{EngineConfig, RawEngineConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawEngineConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawEngineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

/// Deserialize configuration from TOML text.
pub fn parse_str(contents: &str) -> Result<RawEngineConfig> {
    let config: RawEngineConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks inbox capacity and the close policy.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let config = EngineConfig::try_from(raw_config)?;
    debug!(path = %path.display(), ?config, "engine configuration loaded");
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no configuration file; using defaults");
        return Ok(EngineConfig::default());
    }
    load_and_validate(path)
}

/// Default config location: `Caseflow.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Caseflow.toml")
}
