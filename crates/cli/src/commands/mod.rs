pub mod compare;
pub mod config_cmd;
pub mod replay;
pub mod simulate;

use membound_config::{ConfigError, ContextConfig};
use std::path::Path;

/// Load from `path` when given, else from the default location. Environment
/// overrides apply either way.
pub fn load_config(path: Option<&Path>) -> Result<ContextConfig, ConfigError> {
    match path {
        Some(path) => ContextConfig::load_from(path),
        None => ContextConfig::load(),
    }
}
