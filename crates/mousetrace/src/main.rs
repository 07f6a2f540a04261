//! `mousetrace` - CLI for raw pointer capture
//!
//! This binary arms a capture, waits for the trigger button to be pressed
//! and released, and writes the recorded motion to disk.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{debug, info};

use mousetrace::cli::{CaptureCommand, Cli, Command, ConfigCommand, InfoCommand, SimulateCommand};
use mousetrace::export::{
    CsvSink, ExportFormat, ExportMetadata, ExportSink, FileExporter, JsonSink,
};
use mousetrace::source::scripted::{replay, sweep};
use mousetrace::source::{ContextId, InputBackend, ScriptedBackend};
use mousetrace::{init_logging, platform, Config, Error, Recorder, SourceKind};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Capture(cmd) => handle_capture(&config, cmd),
        Command::Simulate(cmd) => handle_simulate(&config, &cmd),
        Command::Info(cmd) => handle_info(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

/// Print the single notice for a failed command.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(e) => {
            let notice = e.notice();
            eprintln!("{}: {}", notice.title, notice.message);
        }
        None => eprintln!("Error: {err}"),
    }
    for cause in err.chain().skip(1) {
        debug!(cause = %cause, "Caused by");
    }
}

fn handle_capture(config: &Config, cmd: CaptureCommand) -> anyhow::Result<()> {
    let mut config = config.clone();
    if let Some(trigger) = cmd.trigger {
        config.capture.trigger_button = trigger.into();
    }
    if let Some(format) = cmd.format {
        config.export.format = format.into();
    }
    if let Some(dir) = cmd.output {
        config.export.output_dir = Some(dir);
    }
    config.validate()?;

    let name = cmd
        .name
        .unwrap_or_else(|| config.export.capture_name.clone());
    let cpi = cmd.cpi.or_else(|| config.export.cpi.clone()).unwrap_or_default();
    // Checked before arming, otherwise the capture would be lost.
    let metadata = ExportMetadata::new(name, cpi)?;
    let mode = cmd.mode.map_or(config.capture.mode, SourceKind::from);

    capture_and_export(&config, mode, &metadata)
}

#[cfg(target_os = "windows")]
fn capture_and_export(
    config: &Config,
    mode: SourceKind,
    metadata: &ExportMetadata,
) -> anyhow::Result<()> {
    let mut recorder = platform::windows::run_capture(&config.capture, mode)?;
    write_export(
        &mut recorder,
        metadata,
        &Destination::File(config.file_exporter()),
    )
}

#[cfg(not(target_os = "windows"))]
fn capture_and_export(
    _config: &Config,
    mode: SourceKind,
    _metadata: &ExportMetadata,
) -> anyhow::Result<()> {
    Err(Error::unsupported(format!(
        "{mode} capture is not available on {}",
        platform::platform_name()
    ))
    .into())
}

fn handle_simulate(config: &Config, cmd: &SimulateCommand) -> anyhow::Result<()> {
    let mut config = config.clone();
    if let Some(format) = cmd.format {
        config.export.format = format.into();
    }
    config.validate()?;

    let name = cmd
        .name
        .clone()
        .unwrap_or_else(|| config.export.capture_name.clone());
    let metadata = ExportMetadata::new(name, cmd.cpi.clone())?;
    let mode = SourceKind::from(cmd.mode);

    let backend = ScriptedBackend::new(cmd.ticks_per_second);
    let events = sweep(cmd.moves, cmd.interval, config.capture.trigger_button);
    let mut recorder =
        Recorder::new(backend, &config.capture).with_passive_context(ContextId(0));

    recorder.start_capture(mode)?;
    match mode {
        SourceKind::Passive => {
            for (at, raw) in &events {
                recorder.dispatch_passive_at(raw, *at);
            }
        }
        SourceKind::ActivePoller => replay(recorder.backend(), &events),
    }
    recorder.wait_for_completion()?;
    info!(events = events.len(), %mode, "Simulated capture finished");

    let destination = match &cmd.output {
        Some(dir) => Destination::File(
            FileExporter::new(dir, config.export.format)
                .with_decimals(config.export.time_decimals),
        ),
        None => Destination::Stdout {
            format: config.export.format,
            decimals: config.export.time_decimals,
        },
    };
    write_export(&mut recorder, &metadata, &destination)
}

/// Where an export is written.
#[derive(Debug)]
enum Destination {
    File(FileExporter),
    Stdout { format: ExportFormat, decimals: usize },
}

fn write_export<B: InputBackend>(
    recorder: &mut Recorder<B>,
    metadata: &ExportMetadata,
    destination: &Destination,
) -> anyhow::Result<()> {
    let samples = recorder.session().map_or(0, |s| s.samples().len());
    let record = recorder.record(metadata)?;

    match destination {
        Destination::File(exporter) => {
            let path = exporter.export(&record, Utc::now())?;
            info!(path = %path.display(), samples, "Capture exported");
            println!("{}", path.display());
        }
        Destination::Stdout { format, decimals } => {
            let stdout = io::stdout();
            match format {
                ExportFormat::Csv => {
                    CsvSink::with_decimals(stdout.lock(), *decimals).write_record(&record)
                }
                ExportFormat::Json => JsonSink::new(stdout.lock(), true).write_record(&record),
            }
            .context("failed to write export to stdout")?;
        }
    }
    Ok(())
}

fn handle_info(config: &Config, cmd: &InfoCommand) -> anyhow::Result<()> {
    let ticks_per_second = platform::ticks_per_second();
    let config_path = Config::default_config_path();

    if cmd.json {
        let info = serde_json::json!({
            "platform": platform::platform_name(),
            "capture_supported": platform::capture_supported(),
            "ticks_per_second": ticks_per_second,
            "mode": config.capture.mode,
            "batch_size": config.capture.batch_size,
            "trigger_button": config.capture.trigger_button,
            "output_dir": config.output_dir(),
            "config_path": config_path,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("mousetrace info");
        println!("---------------");
        println!("Platform:      {}", platform::platform_name());
        println!(
            "Live capture:  {}",
            if platform::capture_supported() { "supported" } else { "not supported" }
        );
        match ticks_per_second {
            Some(tps) => println!("Tick rate:     {tps} ticks/s"),
            None => println!("Tick rate:     n/a"),
        }
        println!("Mode:          {}", config.capture.mode);
        println!("Batch size:    {}", config.capture.batch_size);
        println!("Trigger:       {}", config.capture.trigger_button);
        println!("Output dir:    {}", config.output_dir().display());
        println!("Config file:   {}", config_path.display());
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Capture]");
                println!("  Mode:               {}", config.capture.mode);
                println!("  Initial capacity:   {}", config.capture.initial_capacity);
                println!("  Batch size:         {}", config.capture.batch_size);
                println!("  Trigger button:     {}", config.capture.trigger_button);
                println!("  Elevate priority:   {}", config.capture.elevate_priority);
                println!(
                    "  Raise process:      {}",
                    config.capture.raise_process_priority
                );
                println!();
                println!("[Export]");
                println!("  Output dir:         {}", config.output_dir().display());
                println!("  Capture name:       {}", config.export.capture_name);
                println!(
                    "  CPI:                {}",
                    config.export.cpi.as_deref().unwrap_or("(not set)")
                );
                println!("  Format:             {}", config.export.format.extension());
                println!("  Time decimals:      {}", config.export.time_decimals);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path: PathBuf = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_file(&path) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
