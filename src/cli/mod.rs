//! Command-line interface for fire.
//!
//! Provides commands for running a processing pass, inspecting the
//! resolved configuration, dumping event files and listing the registered
//! module classes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{ConfigOverrides, ProcessConfig};
use crate::core::{EventFile, PluginRegistry, Process};
use crate::logging::{self, LogLevel};

/// fire - event-processing framework
#[derive(Parser, Debug)]
#[command(name = "fire")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a processing pass
    Run {
        /// Process configuration (YAML)
        config: PathBuf,

        /// Maximum number of events to process
        #[arg(short = 'n', long)]
        max_events: Option<u64>,

        /// Input files, replacing those of the configuration
        #[arg(short, long = "input")]
        inputs: Vec<PathBuf>,

        /// Output files, replacing those of the configuration
        #[arg(short, long = "output")]
        outputs: Vec<PathBuf>,

        /// Pass name
        #[arg(short, long)]
        pass: Option<String>,

        /// Run number for generated events
        #[arg(short, long)]
        run: Option<i32>,
    },

    /// Print the resolved process configuration
    Config {
        /// Process configuration (YAML)
        config: PathBuf,
    },

    /// Show the contents of an event file
    Dump {
        /// Event file to read
        file: PathBuf,

        /// Number of events to print
        #[arg(short, long, default_value = "5")]
        events: usize,
    },

    /// List the registered module and provider classes
    Processors,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                config,
                max_events,
                inputs,
                outputs,
                pass,
                run,
            } => {
                let overrides = ConfigOverrides {
                    pass_name: pass,
                    run,
                    max_events,
                    input_files: inputs,
                    output_files: outputs,
                };
                run_process(config, overrides)
            }
            Commands::Config { config } => show_config(config),
            Commands::Dump { file, events } => dump_file(file, events),
            Commands::Processors => list_processors(),
        }
    }
}

fn run_process(path: PathBuf, overrides: ConfigOverrides) -> Result<()> {
    let mut config = ProcessConfig::from_file(&path)?;
    config.apply_overrides(overrides);

    logging::init(
        config.term_log_level,
        config.file_log_level,
        config.log_file.as_deref(),
    )?;

    let registry = PluginRegistry::with_builtins()?;
    let mut process = Process::new(config, &registry)
        .with_context(|| format!("Failed to set up process from {}", path.display()))?;

    info!(modules = ?process.module_names(), "Starting process");
    let summary = process.run()?;

    println!(
        "Processed {} events ({} did not complete)",
        summary.events_processed, summary.events_failed
    );
    Ok(())
}

fn show_config(path: PathBuf) -> Result<()> {
    logging::init(LogLevel::Warn, LogLevel::Off, None)?;

    let config = ProcessConfig::from_file(&path)?;
    config.validate()?;

    println!("# mode: {:?}", config.mode()?);
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn dump_file(path: PathBuf, events: usize) -> Result<()> {
    logging::init(LogLevel::Warn, LogLevel::Off, None)?;

    let file = EventFile::open_input(&path)?;

    println!("File: {}", path.display());
    if let Some(meta) = file.metadata() {
        println!("  id: {}", meta.id);
        println!("  created: {}", meta.created.to_rfc3339());
        println!("  pass: {}", meta.pass);
        println!("  compression: {}", meta.compression);
    }
    println!("  events: {}", file.entries().len());

    println!();
    println!("Products:");
    for product in file.schema() {
        println!("  {}", product);
    }

    println!();
    for header in file.run_headers() {
        print!("{}", header);
    }

    for (i, entry) in file.entries().iter().take(events).enumerate() {
        println!();
        println!("Event {}:", i);
        let text = serde_json::to_string_pretty(entry).context("Failed to format event")?;
        println!("{}", text);
    }
    Ok(())
}

fn list_processors() -> Result<()> {
    let registry = PluginRegistry::with_builtins()?;
    for (name, kind) in registry.classes() {
        println!("{:<40} {}", name, kind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "fire", "run", "reco.yaml", "-n", "10", "-i", "a.jsonl", "-i", "b.jsonl", "--pass", "redo",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                config,
                max_events,
                inputs,
                outputs,
                pass,
                run,
            } => {
                assert_eq!(config, PathBuf::from("reco.yaml"));
                assert_eq!(max_events, Some(10));
                assert_eq!(inputs.len(), 2);
                assert!(outputs.is_empty());
                assert_eq!(pass.as_deref(), Some("redo"));
                assert_eq!(run, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_dump_default_events() {
        let cli = Cli::try_parse_from(["fire", "dump", "out.jsonl"]).unwrap();
        assert!(matches!(cli.command, Commands::Dump { events: 5, .. }));
    }
}
