//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::export::ExportFormat;
use crate::sample::TriggerButton;
use crate::session::SourceKind;

/// Capture command arguments.
#[derive(Debug, Args)]
pub struct CaptureCommand {
    /// Acquisition mechanism (defaults to the configured mode)
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Capture name written to the export
    #[arg(short, long)]
    pub name: Option<String>,

    /// Sensor resolution of the mouse in counts per inch
    #[arg(long)]
    pub cpi: Option<String>,

    /// Directory to write the export to
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Export format
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// Button that starts and stops the recording
    #[arg(short, long, value_enum)]
    pub trigger: Option<TriggerArg>,
}

/// Simulate command arguments.
#[derive(Debug, Args)]
pub struct SimulateCommand {
    /// Acquisition mechanism to drive
    #[arg(short, long, value_enum, default_value = "poller")]
    pub mode: ModeArg,

    /// Number of motion events between press and release
    #[arg(long, default_value = "3")]
    pub moves: usize,

    /// Ticks between consecutive events
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(i64).range(0..))]
    pub interval: i64,

    /// Simulated tick counter frequency
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(i64).range(1..))]
    pub ticks_per_second: i64,

    /// Capture name written to the export
    #[arg(short, long)]
    pub name: Option<String>,

    /// Sensor resolution written to the export
    #[arg(long, default_value = "800")]
    pub cpi: String,

    /// Write the export into this directory instead of stdout
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Export format
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,
}

/// Info command arguments.
#[derive(Debug, Args)]
pub struct InfoCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Acquisition mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Event-driven delivery to a window
    Passive,
    /// Dedicated high-priority polling thread
    Poller,
}

impl From<ModeArg> for SourceKind {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Passive => Self::Passive,
            ModeArg::Poller => Self::ActivePoller,
        }
    }
}

/// Export format argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Comma-separated values
    Csv,
    /// JSON document
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => Self::Csv,
            FormatArg::Json => Self::Json,
        }
    }
}

/// Trigger button argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerArg {
    /// Primary button
    Left,
    /// Secondary button
    Right,
    /// Wheel button
    Middle,
    /// First side button
    Button4,
    /// Second side button
    Button5,
}

impl From<TriggerArg> for TriggerButton {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Left => Self::Left,
            TriggerArg::Right => Self::Right,
            TriggerArg::Middle => Self::Middle,
            TriggerArg::Button4 => Self::Button4,
            TriggerArg::Button5 => Self::Button5,
        }
    }
}
