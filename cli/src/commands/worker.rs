// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `coordfab worker run` and `coordfab worker detect-capabilities`.

use std::collections::HashSet;
use std::sync::Arc;

use clap::{Args, Subcommand};
use tracing::info;

use coord_fabric_core::distributed::capability::detect_capabilities;
use coord_fabric_core::distributed::router::{PeerSource, RequestRouter};
use coord_fabric_core::distributed::types::FabricError;
use coord_fabric_core::distributed::worker_agent::{WorkerAgent, WorkerAgentConfig};
use coord_fabric_core::distributed::worker_api::{self, WorkerApiState};
use coord_fabric_peers::{PeerDiscovery, DEFAULT_DISCOVERY_INTERVAL};

use crate::error::CliError;

/// `coordfab worker` subcommands.
#[derive(Subcommand, Debug)]
pub enum WorkerCommands {
    /// Run the worker agent lifecycle: register, join the DHT, heartbeat.
    Run(RunArgs),
    /// Detect local hardware capabilities and print them as JSON, without
    /// registering with a coordinator.
    DetectCapabilities,
}

/// Arguments for `coordfab worker run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Coordinator base URL, e.g. `http://coordinator:8080`.
    #[arg(long, default_value = "http://localhost:8080")]
    coordinator_url: String,

    /// Service type this worker declares; may be repeated.
    #[arg(long = "service")]
    services: Vec<String>,

    /// Request a reverse tunnel for public reachability.
    #[arg(long)]
    use_tunnel: bool,

    /// Local port the worker's services listen on.
    #[arg(long, default_value_t = 8000)]
    service_port: u16,

    /// Port this worker's DHT node listens on.
    #[arg(long, default_value_t = 0)]
    dht_port: u16,
}

pub async fn execute(command: WorkerCommands, verbose: bool) -> Result<(), CliError> {
    match command {
        WorkerCommands::Run(args) => run(args, verbose).await,
        WorkerCommands::DetectCapabilities => detect_capabilities_cmd(),
    }
}

async fn run(args: RunArgs, verbose: bool) -> Result<(), CliError> {
    let declared_services = args.services.clone();
    let service_port = args.service_port;

    let agent = WorkerAgent::new(WorkerAgentConfig {
        coordinator_url: args.coordinator_url,
        declared_services: args.services,
        service_port: args.service_port,
        use_tunnel: args.use_tunnel,
        external_tunnel_url: None,
        dht_port: if args.dht_port == 0 { 7947 } else { args.dht_port },
    });

    agent.start().await.map_err(|err| match err {
        FabricError::CapabilityFatal(reason) => CliError::capability_detection_failed(&reason),
        FabricError::RegistrationFatal(reason) => CliError::registration_failed(&reason),
        other => CliError::from(other),
    })?;

    if verbose {
        info!(worker_id = ?agent.worker_id(), "worker started, entering heartbeat loop");
    }

    // Widen this worker's candidate pool beyond its own finger cache by
    // sweeping the same DHT node this agent just joined, then feed that
    // cache into the router as a last-resort discovery source.
    let peer_discovery = agent.dht().map(PeerDiscovery::new).map(Arc::new);
    let peer_discovery_handle = peer_discovery
        .as_ref()
        .map(|discovery| discovery.start(DEFAULT_DISCOVERY_INTERVAL));

    let mut local_services: HashSet<String> = HashSet::new();
    local_services.extend(declared_services.iter().cloned());
    let mut router = RequestRouter::new(local_services);
    if let Some(discovery) = &peer_discovery {
        router = router.with_peer_source(Arc::clone(discovery) as Arc<dyn PeerSource>);
    }
    let api_state = Arc::new(WorkerApiState {
        router: Arc::new(router),
        local_handler: None,
    });
    let app = worker_api::router(api_state);

    let bind_address = format!("0.0.0.0:{service_port}");
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|err| {
            CliError::invalid_input(
                &format!("failed to bind {bind_address}: {err}"),
                "check --service-port is free",
            )
        })?;
    if verbose {
        info!(%bind_address, "worker-local service surface listening");
    }

    tokio::select! {
        () = agent.run_heartbeat_loop() => {}
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(%err, "worker-local HTTP server exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    if let Some(handle) = peer_discovery_handle {
        handle.abort();
    }
    agent.shutdown().await;
    Ok(())
}

fn detect_capabilities_cmd() -> Result<(), CliError> {
    let descriptor = detect_capabilities();
    let json = serde_json::to_string_pretty(&descriptor)
        .map_err(|e| CliError::invalid_input(&e.to_string(), "this should never happen"))?;
    println!("{json}");
    Ok(())
}
