// src/config.rs

//! Configuration loading utilities.

use std::path::Path;

use crate::error::Result;
use crate::models::Config;

/// Load the configuration used by the binary.
///
/// A missing file falls back to defaults; a present but unreadable or
/// malformed one is an error. `NEWSROOM_*` environment overrides are applied
/// last and the result is validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let config = Config::load(path)?;
        log::info!("Loaded configuration from {}", path.display());
        config
    } else {
        Config::load_or_default(path)
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
