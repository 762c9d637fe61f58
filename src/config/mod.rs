//! Configuration parsing and types.

pub mod env;
pub mod parser;
pub mod relay;
pub mod types;
pub mod validate;

use std::path::Path;

use tracing::info;

use crate::common::error::ConfigError;

pub use env::{apply_env_overrides, get_config_path};
pub use parser::load_config;
pub use relay::RelayConfig;
pub use validate::validate_config;

/// Load, override from the environment, validate and compile a config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<RelayConfig, ConfigError> {
    let path = path.as_ref();
    let config = apply_env_overrides(load_config(path)?);
    validate_config(&config)?;
    let relay = RelayConfig::from_config(&config)?;
    info!(
        path = %path.display(),
        bots = relay.bots.len(),
        "Configuration loaded"
    );
    Ok(relay)
}
