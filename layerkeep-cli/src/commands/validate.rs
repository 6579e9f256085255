//! Validate command - check a layer catalog without touching a surface.

use std::path::Path;

use console::style;
use layerkeep::registry::{LayerRegistry, RegistryConfig};

use super::common::{heading, load_catalog, status_line, warning_line};
use crate::error::CliError;

/// Run the validate command.
///
/// Registers everything it can with reference checks deferred, then
/// reports every finding at once.
pub fn run(catalog_path: &Path, base: &RegistryConfig) -> Result<(), CliError> {
    let catalog = load_catalog(catalog_path)?;
    let config = RegistryConfig {
        validate_on_registration: false,
        strict_mode: false,
        ..base.clone()
    };
    let registry = LayerRegistry::from_catalog(&catalog, config)?;

    heading("Catalog");
    println!(
        "  {} sources, {} layers",
        registry.source_count(),
        registry.layer_count()
    );

    let issues = registry.validate_all();
    let errors = issues.iter().filter(|i| i.is_error()).count();

    heading("Findings");
    if issues.is_empty() {
        status_line(true, "no issues");
    }
    for issue in &issues {
        if issue.is_error() {
            status_line(false, issue);
        } else {
            warning_line(issue);
        }
    }

    if errors > 0 {
        return Err(CliError::Invalid(errors));
    }
    println!();
    println!("{}", style("Catalog is valid").green().bold());
    Ok(())
}
