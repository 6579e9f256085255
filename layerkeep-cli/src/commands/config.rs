//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use layerkeep::config::EngineConfig;

use super::common::load_engine_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, CliError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => EngineConfig::default_path().ok_or(CliError::NoConfigDir),
    }
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, explicit: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", resolve_path(explicit)?.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = load_engine_config(explicit)?;
            println!("[queue]");
            println!("max_retries = {}", config.queue.max_retries);
            println!("retry_delay_ms = {}", config.queue.retry_delay.as_millis());
            println!("max_queue_size = {}", config.queue.max_queue_size);
            println!("timeout_secs = {}", config.queue.timeout.as_secs());
            println!("ready_timeout_secs = {}", config.queue.ready_timeout.as_secs());
            println!();
            println!("[performance]");
            println!(
                "slow_operation_threshold_ms = {}",
                config.performance.slow_operation_threshold.as_millis()
            );
            println!("enable_metrics = {}", config.performance.enable_metrics);
            println!(
                "log_slow_operations = {}",
                config.performance.log_slow_operations
            );
            println!();
            println!("[registry]");
            println!(
                "validate_on_registration = {}",
                config.registry.validate_on_registration
            );
            println!("allow_duplicate_ids = {}", config.registry.allow_duplicate_ids);
            println!("strict_mode = {}", config.registry.strict_mode);
            Ok(())
        }
        ConfigCommands::Init { force } => {
            let path = resolve_path(explicit)?;
            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!("Use --force to overwrite it.");
                return Ok(());
            }
            EngineConfig::default().save(&path)?;
            println!("Configuration file: {}", path.display());
            Ok(())
        }
    }
}
