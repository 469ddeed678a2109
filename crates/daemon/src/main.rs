// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenure daemon (tenured)
//!
//! Competes for a lease and runs the configured command while it leads.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use tenure_daemon::lifecycle::{self, setup_logging, Config};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "tenure.toml";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be up yet, so report on stderr too
            eprintln!("tenured: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = Config::load(&config_path)?;
    let log_guard = setup_logging(&config.logging)?;

    info!("Starting tenured with config {}", config_path.display());

    let daemon = match lifecycle::startup(config).await {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        holder = %daemon.config.holder,
        resource = %daemon.config.election.resource,
        "Daemon ready"
    );

    // Signal ready for a parent process waiting on startup
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }

    daemon.shutdown().await?;
    info!("Daemon stopped");
    drop(log_guard);
    Ok(())
}
