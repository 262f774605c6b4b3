//! CLI-level configuration loading: file < environment < CLI-flag layers
//! on top of `dronedb_core::config::LayeredConfig`'s defaults.

use anyhow::Result;
use dronedb_core::config::{CliConfigOverrides, LayeredConfig};
use std::path::Path;

/// Loads `<root>/.ddb/config.toml` (if present), applies environment
/// variables, then any CLI flag overrides the caller collected.
pub fn load(root: &Path, overrides: CliConfigOverrides) -> Result<LayeredConfig> {
    let config_path = root.join(".ddb").join("config.toml");
    let mut config = LayeredConfig::with_defaults().load_from_file(&config_path)?.load_from_env();
    config.update_from_cli(overrides);
    Ok(config)
}
