// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `coordfab coordinator run`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use tracing::info;

use coord_fabric_core::config::ConfigLoader;
use coord_fabric_core::distributed::coordinator::{Coordinator, CoordinatorConfig};

/// `coordfab coordinator` subcommands.
#[derive(Subcommand, Debug)]
pub enum CoordinatorCommands {
    /// Start the coordinator HTTP API, registry, health monitor, readiness
    /// orchestrator, and DHT bootstrap node.
    Run(RunArgs),
}

/// Arguments for `coordfab coordinator run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to a config.toml overriding the default search path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the coordinator's HTTP bind address (host:port).
    #[arg(long)]
    bind: Option<String>,
}

pub async fn execute(command: CoordinatorCommands, verbose: bool) -> anyhow::Result<()> {
    match command {
        CoordinatorCommands::Run(args) => run(args, verbose).await,
    }
}

/// Run the coordinator: load config, start the HTTP API, health monitor,
/// readiness orchestrator, and DHT seed node. Blocks until SIGINT/SIGTERM.
async fn run(args: RunArgs, verbose: bool) -> anyhow::Result<()> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_file(path);
    }
    let config = loader.load().context("failed to load configuration")?;

    let bind_address = args.bind.unwrap_or(config.coordinator.bind_address.clone());
    let dht_host = bind_address
        .rsplit_once(':')
        .map(|(host, _)| host.to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string());

    let coordinator = Coordinator::new(CoordinatorConfig {
        dht_host,
        dht_port: config.coordinator.dht_port,
        required_services: config.coordinator.required_services.clone(),
        auth_token: config.coordinator.auth_token.clone(),
    });
    coordinator.spawn_background_tasks();

    if verbose {
        info!(?bind_address, "starting coordinator");
    }

    let router = coord_fabric_core::api::router(coordinator.app_state());
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    info!(%bind_address, "coordinator listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("coordinator HTTP server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
