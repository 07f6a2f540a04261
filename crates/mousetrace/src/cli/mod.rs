//! Command-line interface for mousetrace.
//!
//! This module provides the CLI structure for the `mousetrace` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CaptureCommand, ConfigCommand, FormatArg, InfoCommand, ModeArg, SimulateCommand, TriggerArg,
};

use crate::logging::Verbosity;

/// mousetrace - Record raw pointer motion for sensor analysis
///
/// Captures unaccelerated mouse counts between a press and release of the
/// trigger button and exports them with session-relative timestamps.
#[derive(Debug, Parser)]
#[command(name = "mousetrace")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record one capture from the pointer device and export it
    Capture(CaptureCommand),

    /// Run a scripted capture through the full pipeline
    Simulate(SimulateCommand),

    /// Show platform and clock information
    Info(InfoCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
