//! Simulate command - drive the engine against a headless surface.
//!
//! Loads a catalog, applies the requested intents in a fixed order (base
//! layer, preset, view, shows, hides, zones toggle), optionally injects
//! drift, then validates and optionally repairs.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use console::style;
use layerkeep::config::EngineConfig;
use layerkeep::orchestrator::{BatchOptions, BatchResult, LayerOrchestrator, VisibilityChange};
use layerkeep::policy::{BaseLayer, MapLayerPolicy};
use layerkeep::registry::LayerRegistry;
use layerkeep::surface::InMemorySurface;
use layerkeep::types::{Visibility, VISIBILITY_PROPERTY};

use super::common::{heading, load_catalog, load_policy, status_line, warning_line};
use crate::error::CliError;

/// Arguments for `simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Layer catalog (JSON)
    pub catalog: PathBuf,

    /// Policy file with presets and view modes (JSON)
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Layer to show (repeatable)
    #[arg(long = "show", value_name = "LAYER")]
    pub show: Vec<String>,

    /// Layer to hide (repeatable)
    #[arg(long = "hide", value_name = "LAYER")]
    pub hide: Vec<String>,

    /// Base layer: streets, satellite, hybrid or terrain
    #[arg(long, value_name = "NAME")]
    pub base: Option<BaseLayer>,

    /// Preset from the policy file
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// View selection as MODE=VIEW
    #[arg(long, value_name = "MODE=VIEW")]
    pub view: Option<String>,

    /// Flip the zones overlay
    #[arg(long)]
    pub toggle_zones: bool,

    /// Disable map interactions while batches run
    #[arg(long)]
    pub ultra_fast: bool,

    /// Flip the visibility of every visible layer behind the engine's back
    #[arg(long)]
    pub drift: bool,

    /// Repair drift found by validation
    #[arg(long)]
    pub fix: bool,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs, config: &EngineConfig) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(simulate(args, config))
}

async fn simulate(args: SimulateArgs, config: &EngineConfig) -> Result<(), CliError> {
    let catalog = load_catalog(&args.catalog)?;
    let registry = LayerRegistry::from_catalog(&catalog, config.registry.clone())?;
    let mut policy_config = load_policy(args.policy.as_ref())?;
    policy_config.ultra_fast |= args.ultra_fast;

    let surface = Arc::new(InMemorySurface::loaded());
    let orchestrator = Arc::new(LayerOrchestrator::new(registry, surface.clone(), config));
    let policy = MapLayerPolicy::new(orchestrator.clone(), policy_config);
    let options = BatchOptions {
        ultra_fast: args.ultra_fast,
    };

    heading("Intents");
    if let Some(base) = args.base {
        report(&format!("base layer {}", base), &policy.set_base_layer(base).await);
    }
    if let Some(preset) = &args.preset {
        report(&format!("preset {}", preset), &policy.apply_preset(preset).await?);
    }
    if let Some(selection) = &args.view {
        let (mode, view) = selection.split_once('=').unwrap_or((selection.as_str(), ""));
        report(
            &format!("view {}={}", mode, view),
            &policy.select_view(mode, view).await?,
        );
    }
    if !args.show.is_empty() {
        report("show", &policy.activate_layers(args.show.as_slice()).await);
    }
    if !args.hide.is_empty() {
        let hides: Vec<VisibilityChange> =
            args.hide.iter().map(VisibilityChange::hide).collect();
        report(
            "hide",
            &orchestrator.batch_set_layer_visibility(&hides, options).await,
        );
    }
    if args.toggle_zones {
        report("toggle zones", &policy.toggle_zones().await);
    }

    if args.drift {
        let state = orchestrator.state();
        for layer_id in &state.visible_layers {
            surface.force_layout(layer_id, VISIBILITY_PROPERTY, Visibility::None.to_value());
        }
        tracing::info!(layers = state.visible_layers.len(), "Injected visibility drift");
    }

    heading("Validation");
    let issues = orchestrator.validate_state();
    if issues.is_empty() {
        status_line(true, "surface matches believed state");
    }
    for issue in &issues {
        warning_line(issue);
    }

    if args.fix && !issues.is_empty() {
        let result = orchestrator.auto_fix(&issues).await;
        for fix in &result.fixes {
            status_line(true, fix);
        }
        for error in &result.errors {
            status_line(false, error);
        }
        let remaining = orchestrator.validate_state().len();
        println!("  {} issue(s) remaining", remaining);
    }

    heading("State");
    let state = orchestrator.state();
    println!(
        "{}",
        serde_json::to_string_pretty(&state).unwrap_or_else(|e| e.to_string())
    );

    heading("Queue");
    let status = orchestrator.queue_status();
    println!(
        "  size {}  processing {}  surface ready {}",
        status.size, status.processing, status.surface_ready
    );

    heading("Performance");
    let stats = orchestrator.performance_stats();
    println!(
        "  {} operations, {} failed, {} slow, avg {:?}",
        stats.total, stats.failed, stats.slow_operations, stats.average_duration
    );
    for (operation_type, type_stats) in &stats.by_type {
        println!(
            "  {:<16} {:>4} ok {:>4} failed",
            operation_type, type_stats.successful, type_stats.failed
        );
    }
    Ok(())
}

fn report(label: &str, result: &BatchResult) {
    status_line(
        result.success,
        format!("{} ({})", style(label).bold(), result.summary),
    );
    for failure in result.failures() {
        let reason = failure
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        println!("      {}: {}", failure.layer_id, style(reason).red());
    }
    for warning in result.results.iter().flat_map(|r| &r.warnings) {
        println!("      {}", style(warning).dim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"{
        "sources": [
            {"id": "zones", "type": "geojson", "data": {}},
            {"id": "streets", "type": "vector", "url": "https://tiles.example/streets.json"}
        ],
        "layers": [
            {"id": "streets", "name": "Streets", "category": "base", "source": "streets"},
            {"id": "zones-fill", "name": "Zones", "category": "zones", "source": "zones"}
        ]
    }"#;

    fn args(catalog: PathBuf) -> SimulateArgs {
        SimulateArgs {
            catalog,
            policy: None,
            show: Vec::new(),
            hide: Vec::new(),
            base: None,
            preset: None,
            view: None,
            toggle_zones: false,
            ultra_fast: false,
            drift: false,
            fix: false,
        }
    }

    #[test]
    fn test_simulate_with_drift_and_fix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let args = SimulateArgs {
            base: Some(BaseLayer::Streets),
            toggle_zones: true,
            drift: true,
            fix: true,
            ..args(file.path().to_path_buf())
        };
        assert!(run(args, &EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_unknown_preset_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let args = SimulateArgs {
            preset: Some("night".into()),
            ..args(file.path().to_path_buf())
        };
        assert!(matches!(
            run(args, &EngineConfig::default()),
            Err(CliError::Policy(_))
        ));
    }
}
