//! Standard locations for spool configuration files

use std::path::PathBuf;

/// Directory holding spool configuration
///
/// Returns: `<user config dir>/spool`, or `./spool` when the platform has no
/// config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spool")
}

/// Default path of a config file, e.g. `default_config_path("loader.yaml")`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
