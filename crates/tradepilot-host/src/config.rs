//! Host configuration file.
//!
//! ```toml
//! snapshot_path = "tradepilot-cache.json"
//!
//! [worker]
//! version = "1.0.0"
//! origin = "https://app.tradepilot.ai"
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tradepilot_common::{LogConfig, LogFormat, PilotError, Result};
use tradepilot_sw::WorkerConfig;

/// Everything the host reads from disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Where the cache storage snapshot is kept between runs.
    pub snapshot_path: PathBuf,

    /// Worker settings.
    pub worker: WorkerConfig,

    /// Logging settings.
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Level name ("trace" through "error").
    pub level: String,

    pub format: LogFormat,

    /// Directive string, overrides `level` (e.g. "tradepilot_sw=debug").
    pub filter: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("tradepilot-cache.json"),
            worker: WorkerConfig::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            filter: None,
        }
    }
}

impl HostConfig {
    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
            .map_err(|e| PilotError::config(format!("{}: {e}", path.display())))
    }

    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PilotError::config_with_source("invalid host config", e))
    }

    /// Build the logging setup.
    pub fn log_config(&self) -> Result<LogConfig> {
        let config = LogConfig::default()
            .with_level_str(&self.logging.level)?
            .with_format(self.logging.format);
        Ok(match &self.logging.filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        })
    }
}
