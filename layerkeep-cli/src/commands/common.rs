//! Helpers shared across CLI commands.

use std::path::{Path, PathBuf};

use console::style;
use layerkeep::config::EngineConfig;
use layerkeep::policy::PolicyConfig;
use layerkeep::types::LayerCatalog;

use crate::error::CliError;

/// Loads the engine config from `--config`, else the default location,
/// else defaults.
pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => match EngineConfig::default_path() {
            Some(path) => Ok(EngineConfig::load_or_default(&path)?),
            None => Ok(EngineConfig::default()),
        },
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON layer catalog.
pub fn load_catalog(path: &Path) -> Result<LayerCatalog, CliError> {
    LayerCatalog::from_json(&read(path)?).map_err(|source| CliError::Catalog {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON policy file; no file means no presets or view modes.
pub fn load_policy(path: Option<&PathBuf>) -> Result<PolicyConfig, CliError> {
    let Some(path) = path else {
        return Ok(PolicyConfig::default());
    };
    PolicyConfig::from_json(&read(path)?).map_err(|source| CliError::Catalog {
        path: path.clone(),
        source,
    })
}

/// Prints a section heading.
pub fn heading(title: &str) {
    println!();
    println!("{}", style(title).bold().underlined());
}

/// Prints a line marked ok or failed.
pub fn status_line(ok: bool, text: impl std::fmt::Display) {
    let mark = if ok {
        style("✓").green()
    } else {
        style("✗").red()
    };
    println!("  {} {}", mark, text);
}

/// Prints a warning line.
pub fn warning_line(text: impl std::fmt::Display) {
    println!("  {} {}", style("!").yellow(), text);
}
