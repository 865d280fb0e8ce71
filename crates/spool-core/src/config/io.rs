//! Reading and writing [`LoaderConfig`] as YAML

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};

use super::LoaderConfig;

impl LoaderConfig {
    /// Read the config at `path`, falling back to defaults
    ///
    /// A missing file is normal and quietly yields the defaults. A file that
    /// cannot be read or parsed is logged and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::read(path) {
            Ok(Some(config)) => {
                log::info!("Loader config read from {:?}", path);
                config
            }
            Ok(None) => {
                log::debug!("No loader config at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                log::warn!("Ignoring loader config: {:#}", e);
                Self::default()
            }
        }
    }

    /// Parse the config at `path`, or `Ok(None)` if there is no such file
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        let config = serde_yaml::from_str(&text)
            .with_context(|| format!("Invalid loader config in {:?}", path))?;
        Ok(Some(config))
    }

    /// Write the config to `path`, creating missing directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize loader config")?;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {:?}", dir))?;
        }
        std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;

        log::info!("Loader config written to {:?}", path);
        Ok(())
    }
}
