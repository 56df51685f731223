//! # Signal Handling
//!
//! Installs OS signal handlers and wires them to a [`ShutdownCoordinator`].
//!
//! SIGTERM and SIGINT both initiate graceful shutdown; SIGHUP is logged
//! and ignored (no config-reload support in this rewrite — the orchestrator
//! re-resolves its descriptor only on `init`/`config validate` runs).

use crate::shutdown::ShutdownCoordinator;

#[cfg(unix)]
pub async fn install(coordinator: ShutdownCoordinator) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGHUP handler");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM");
                    coordinator.initiate_shutdown();
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT");
                    coordinator.initiate_shutdown();
                    break;
                }
                _ = sighup.recv() => {
                    tracing::warn!("received SIGHUP (ignored, no hot-reload in this build)");
                }
            }
        }
    });
}

#[cfg(windows)]
pub async fn install(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            return;
        }
        tracing::info!("received Ctrl-C");
        coordinator.initiate_shutdown();
    });
}
