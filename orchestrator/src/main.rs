//! # Orchestrator Entry Point
//!
//! Two ways this binary is invoked:
//!
//! 1. As a worker, with the hidden `__worker` argument `spawn_worker`
//!    passes its children. Intercepted against raw `std::env::args()`
//!    *before* `clap::Parser::parse()` ever runs, so it never shows up
//!    in `--help` or the bootstrap crate's four-command surface.
//! 2. As the supervisor, via the public CLI: `config validate`, `init`,
//!    `plugins list`, `web serve`.

use orchestrator_domain::OrchestratorError;
use pipeline_orchestrator::backends::{BackendRegistry, PluginGroup};
use pipeline_orchestrator::config::{resolve_config, OrchestratorConfig};
use pipeline_orchestrator::metrics::{endpoint, MetricsRegistry};
use pipeline_orchestrator::monitor::Monitor;
use pipeline_orchestrator::store::{HttpTimeSeriesStore, NullTimeSeriesStore, TimeSeriesStore};
use pipeline_orchestrator::supervisor::{server, Supervisor};
use pipeline_orchestrator::worker;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> std::process::ExitCode {
    // The hidden worker subcommand is checked against raw args before
    // clap ever sees them, so it never appears in --help or the public
    // four-command surface.
    if std::env::args().nth(1).as_deref() == Some(worker::WORKER_SUBCOMMAND) {
        let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                eprintln!("{{\"error_type\":\"INTERNAL_ERROR\",\"public_error_message\":\"failed to start worker runtime: {e}\"}}");
                return std::process::ExitCode::FAILURE;
            }
        };
        runtime.block_on(run_worker());
        return std::process::ExitCode::SUCCESS;
    }

    let validated = match orchestrator_bootstrap::parse_and_validate() {
        Ok(validated) => validated,
        Err(e) => {
            eprintln!("{{\"error_type\":\"INVALID_PAYLOAD\",\"public_error_message\":\"{e}\"}}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{{\"error_type\":\"INTERNAL_ERROR\",\"public_error_message\":\"failed to start runtime: {e}\"}}");
            return std::process::ExitCode::FAILURE;
        }
    };

    pipeline_orchestrator::logging::init(if validated.verbose { "debug" } else { "info" });

    match runtime.block_on(dispatch(validated.command)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            let envelope = serde_json::json!({
                "error_type": e.error_type(),
                "public_error_message": e.public_error_message(),
            });
            eprintln!("{envelope}");
            std::process::ExitCode::FAILURE
        }
    }
}

/// Runs the worker process loop against real stdio. Invoked only via the
/// hidden `__worker` argument. Re-resolves the descriptor from
/// `CORAL_*` environment variables, which `spawn_worker` leaves the child
/// to inherit rather than serializing the whole descriptor over argv.
async fn run_worker() {
    let config = match resolve_config(None, &[], false) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "worker failed to resolve config from environment, using defaults");
            OrchestratorConfig::default()
        }
    };
    pipeline_orchestrator::logging::init("info");
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    worker::process::run(Arc::new(config), stdin, stdout).await;
}

async fn dispatch(command: orchestrator_bootstrap::cli::ValidatedCommand) -> Result<(), OrchestratorError> {
    use orchestrator_bootstrap::cli::ValidatedCommand;

    match command {
        ValidatedCommand::ConfigValidate { config, overrides, no_env } => {
            let resolved = resolve_config(config.as_deref(), &overrides, no_env)?;
            print_json(&resolved)
        }
        ValidatedCommand::Init { config, overrides, no_env } => {
            let resolved = resolve_config(config.as_deref(), &overrides, no_env)?;
            std::fs::create_dir_all(&resolved.cache_root)
                .map_err(|e| OrchestratorError::internal_error(format!("creating cache_root: {e}")))?;
            std::fs::create_dir_all(&resolved.output_dir)
                .map_err(|e| OrchestratorError::internal_error(format!("creating output_dir: {e}")))?;
            print_json(&resolved)
        }
        ValidatedCommand::PluginsList { group } => {
            let resolved = resolve_config(None, &[], false)?;
            let registry = BackendRegistry::from_config(&resolved);
            let group = group.map(|g| match g {
                orchestrator_bootstrap::cli::PluginGroup::Backends => PluginGroup::Backends,
                orchestrator_bootstrap::cli::PluginGroup::Patches => PluginGroup::Patches,
                orchestrator_bootstrap::cli::PluginGroup::Workflows => PluginGroup::Workflows,
            });
            let listed = registry.list(group);
            let as_map: std::collections::BTreeMap<&str, &[pipeline_orchestrator::backends::PluginEntry]> =
                listed.into_iter().collect();
            print_json(&as_map)
        }
        ValidatedCommand::WebServe { config, host, port, reload: _ } => run_web_serve(config, host, port).await,
    }
}

async fn run_web_serve(config: Option<std::path::PathBuf>, host: String, port: u16) -> Result<(), OrchestratorError> {
    let resolved = Arc::new(resolve_config(config.as_deref(), &[], false)?);
    let metrics = MetricsRegistry::new();
    let shutdown = CancellationToken::new();

    let store: Arc<dyn TimeSeriesStore> = match resolved.services.get("time_series_endpoint").and_then(|v| v.as_str()) {
        Some(endpoint_url) => Arc::new(HttpTimeSeriesStore::new(endpoint_url, resolved.tunables.queue_timeout())?),
        None => Arc::new(NullTimeSeriesStore),
    };

    let supervisor = Supervisor::new(resolved.clone(), metrics.clone(), shutdown.clone());
    let mut handles = supervisor.spawn_background_loops();

    let monitor = Monitor::new(supervisor.clone(), resolved.clone(), store, metrics.clone(), shutdown.clone());
    handles.push(tokio::spawn(monitor.run()));

    let socket_addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| OrchestratorError::invalid_payload(format!("invalid host/port: {e}")))?;
    let metrics_addr: SocketAddr = format!("{host}:{}", port.saturating_add(1))
        .parse()
        .map_err(|e| OrchestratorError::invalid_payload(format!("invalid metrics host/port: {e}")))?;

    let shutdown_coordinator = orchestrator_bootstrap::shutdown::ShutdownCoordinator::default();
    // Bridges this crate's tokio_util-based CancellationToken to the
    // bootstrap crate's own token type, which signal installation is
    // written against.
    let bridge_shutdown = shutdown.clone();
    let signal_token = shutdown_coordinator.token();
    tokio::spawn(async move {
        signal_token.cancelled().await;
        bridge_shutdown.cancel();
    });
    orchestrator_bootstrap::signals::install(shutdown_coordinator).await;

    let metrics_task = tokio::spawn(endpoint::serve(metrics_addr, metrics, shutdown.clone()));

    let serve_result = server::serve(socket_addr, supervisor.clone(), shutdown.clone()).await;

    supervisor.shutdown().await;
    for handle in handles {
        let _ = handle.await;
    }
    let _ = metrics_task.await;

    serve_result.map_err(|e| OrchestratorError::internal_error(format!("socket server: {e}")))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), OrchestratorError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| OrchestratorError::internal_error(format!("serializing response: {e}")))?;
    println!("{json}");
    Ok(())
}
