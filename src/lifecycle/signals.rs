//! OS signal handling.
//!
//! # Responsibilities
//! - SIGHUP → request a configuration reload through the watcher's trigger
//! - Ctrl+C → stop serving
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP goes through the same cool-down as file events

use std::io;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::Trigger;

/// Forward every SIGHUP to `trigger` until the receiver is gone.
#[cfg(unix)]
pub fn forward_reloads(trigger: UnboundedSender<Trigger>) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading configuration");
            if trigger.send(Trigger::Signal).is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn forward_reloads(_trigger: UnboundedSender<Trigger>) -> io::Result<()> {
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
