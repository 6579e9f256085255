//! CLI error type.

use std::path::PathBuf;

use layerkeep::config::ConfigError;
use layerkeep::policy::PolicyError;
use layerkeep::registry::RegistryError;
use thiserror::Error;

/// Everything a command can fail with.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid catalog {path}: {source}")]
    Catalog {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("catalog rejected: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("failed to start runtime: {0}")]
    Runtime(std::io::Error),

    #[error("{0} error(s) found")]
    Invalid(usize),

    #[error("no config directory available on this platform")]
    NoConfigDir,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Invalid(_) => 1,
            _ => 2,
        }
    }
}
