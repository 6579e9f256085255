//! layerkeep CLI - Command-line interface
//!
//! Validates layer catalogs and drives the reconciliation engine against a
//! headless in-memory map surface.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use layerkeep::logging::{init_logging, LoggingConfig};

use commands::common::load_engine_config;
use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "layerkeep", version, about = "Layer-state reconciliation for interactive maps")]
struct Cli {
    /// Engine configuration file (INI)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check a layer catalog for errors
    Validate {
        /// Layer catalog (JSON)
        catalog: PathBuf,
    },

    /// Apply intents to a headless surface and report the result
    Simulate(SimulateArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Validate { catalog } => {
            let config = load_engine_config(config_path)?;
            commands::validate::run(&catalog, &config.registry)
        }
        Commands::Simulate(args) => {
            let config = load_engine_config(config_path)?;
            commands::simulate::run(args, &config)
        }
        Commands::Config { command } => commands::config::run(command, config_path),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        log_dir: cli.log_dir.clone(),
        ..LoggingConfig::with_level(if cli.verbose { "debug" } else { "warn" })
    };
    let _guard = init_logging(&logging);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}
