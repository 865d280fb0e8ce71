//! Loader configuration
//!
//! - YAML reading and writing of [`LoaderConfig`]
//! - Default config location
//! - [`LoaderConfig`], the settings a [`Loader`](crate::Loader) is built from
//!
//! # Usage
//!
//! ```ignore
//! use spool_core::config::{default_config_path, LoaderConfig};
//!
//! let config = LoaderConfig::load_or_default(&default_config_path("loader.yaml"));
//! let loader = Loader::from_config(&config)?;
//! ```

mod io;
mod paths;

pub use paths::{default_config_dir, default_config_path};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for a loader and the loads it starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Name of the worker thread, shown in debuggers and logs
    /// Default: "spool-loader"
    pub thread_name: String,

    /// Delay before `load()` for callers that use the configured delay
    /// Default: 0 (start immediately)
    pub start_delay_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            thread_name: "spool-loader".to_string(),
            start_delay_ms: 0,
        }
    }
}

impl LoaderConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
}
