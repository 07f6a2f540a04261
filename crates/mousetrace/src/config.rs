//! Configuration management for mousetrace.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_CAPACITY;
use crate::error::{Error, Result};
use crate::export::{ExportFormat, FileExporter, DEFAULT_TIME_DECIMALS};
use crate::sample::TriggerButton;
use crate::session::SourceKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "mousetrace";

/// Environment variable prefix.
const ENV_PREFIX: &str = "MOUSETRACE_";

/// Largest accepted poller batch.
pub const MAX_BATCH_SIZE: usize = 1024;

/// Most decimals the time column can carry.
pub const MAX_TIME_DECIMALS: usize = 9;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `MOUSETRACE_`, `__` between
///    section and key, e.g. `MOUSETRACE_CAPTURE__BATCH_SIZE`)
/// 2. TOML config file at `~/.config/mousetrace/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture configuration.
    pub capture: CaptureConfig,
    /// Export configuration.
    pub export: ExportConfig,
}

/// Capture-related configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Acquisition mechanism used when none is given on the command line.
    pub mode: SourceKind,
    /// Samples preallocated before a capture starts.
    pub initial_capacity: usize,
    /// Raw input records drained per poller wake.
    pub batch_size: usize,
    /// Button whose press and release bound a recording.
    pub trigger_button: TriggerButton,
    /// Raise the poller thread to time-critical priority.
    pub elevate_priority: bool,
    /// Raise the whole process above normal priority while capturing.
    pub raise_process_priority: bool,
    /// Poller thread stack size in bytes; platform default when unset.
    pub poller_stack_size: Option<usize>,
}

/// Export-related configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory export files are written to.
    /// Defaults to the current directory.
    pub output_dir: Option<PathBuf>,
    /// Capture name written in the first row and used for the file name.
    pub capture_name: String,
    /// Sensor resolution of the device; must be supplied before exporting.
    pub cpi: Option<String>,
    /// File format.
    pub format: ExportFormat,
    /// Digits after the decimal point in the time column.
    pub time_decimals: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: SourceKind::Passive,
            initial_capacity: DEFAULT_CAPACITY,
            batch_size: 32,
            trigger_button: TriggerButton::Left,
            elevate_priority: true,
            raise_process_priority: true,
            poller_stack_size: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            capture_name: "MouseCapture".to_string(),
            cpi: None,
            format: ExportFormat::Csv,
            time_decimals: DEFAULT_TIME_DECIMALS,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let config: Config = Self::figment(&config_file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load only defaults and the given file, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or fails validation.
    pub fn load_file(config_file: &Path) -> Result<Self> {
        let config: Config = Self::figment(config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.capture.initial_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "initial_capacity must be greater than 0".to_string(),
            });
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.capture.batch_size) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "batch_size ({}) must be between 1 and {MAX_BATCH_SIZE}",
                    self.capture.batch_size
                ),
            });
        }

        if self.export.time_decimals > MAX_TIME_DECIMALS {
            return Err(Error::ConfigValidation {
                message: format!(
                    "time_decimals ({}) cannot be greater than {MAX_TIME_DECIMALS}",
                    self.export.time_decimals
                ),
            });
        }

        if self.export.capture_name.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "capture_name must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the export directory, resolving defaults if not set.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// A file exporter honoring the export section.
    #[must_use]
    pub fn file_exporter(&self) -> FileExporter {
        FileExporter::new(self.output_dir(), self.export.format)
            .with_decimals(self.export.time_decimals)
    }
}
