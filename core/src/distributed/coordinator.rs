// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Coordinator process: wires the worker registry, health monitor,
//! readiness orchestrator, and a coordinator-side DHT seed node into one
//! long-running unit. There is no global singleton; a [`Coordinator`] is
//! constructed once by the binary entry point and threaded explicitly into
//! the API's [`AppState`](crate::api::AppState).

use std::sync::Arc;

use tracing::info;

use crate::distributed::dht::DhtNode;
use crate::distributed::health::{spawn_supervised, HealthMonitor};
use crate::distributed::readiness::{ReadinessOrchestrator, ReadyCallback, ServiceQuorum};
use crate::distributed::registry::WorkerRegistry;
use crate::distributed::types::FabricError;

/// Coordinator configuration, populated from the layered config system.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Host this coordinator's DHT node binds and advertises.
    pub dht_host: String,
    /// Port this coordinator's DHT node listens on.
    pub dht_port: u16,
    /// Service types that must each have at least one online worker before
    /// readiness fires.
    pub required_services: Vec<String>,
    /// Bearer token required on `/api/worker/register` and
    /// `/api/worker/heartbeat`. `None` disables the check.
    pub auth_token: Option<String>,
}

/// A [`ReadyCallback`] that only logs; the default when no external
/// notification target (webhook, command) is configured.
struct LogOnReady;

#[async_trait::async_trait]
impl ReadyCallback for LogOnReady {
    async fn on_ready(&self) -> Result<(), FabricError> {
        info!("fleet reached the configured service quorum");
        Ok(())
    }
}

/// The coordinator: owns the registry, health monitor, readiness
/// orchestrator, and DHT seed node for the lifetime of the process.
pub struct Coordinator {
    pub registry: Arc<WorkerRegistry>,
    pub dht: Arc<DhtNode>,
    pub readiness: Arc<ReadinessOrchestrator>,
    health_monitor: Arc<HealthMonitor>,
    auth_token: Option<String>,
}

impl Coordinator {
    /// Construct a coordinator from configuration. Does not start any
    /// background task; call [`Coordinator::spawn_background_tasks`] once
    /// the caller is ready to run.
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_callback(config, Arc::new(LogOnReady))
    }

    /// As [`Coordinator::new`], but with an explicit readiness callback —
    /// used by binaries that want to notify an external system (a webhook,
    /// a orchestration command) once the fleet is ready.
    #[must_use]
    pub fn with_callback(config: CoordinatorConfig, callback: Arc<dyn ReadyCallback>) -> Self {
        let registry = Arc::new(WorkerRegistry::new());
        let dht = DhtNode::new(config.dht_host, config.dht_port);
        let health_monitor = Arc::new(HealthMonitor::new((*registry).clone()));
        let readiness = Arc::new(ReadinessOrchestrator::new(
            Arc::clone(&registry),
            ServiceQuorum {
                required_services: config.required_services,
            },
            callback,
        ));

        Self {
            registry,
            dht,
            readiness,
            health_monitor,
            auth_token: config.auth_token,
        }
    }

    /// Spawn the supervised health sweep loop and the readiness poll loop.
    /// Both run until the process exits; panics in either are restarted by
    /// their own supervision (the health monitor's backoff supervisor, and
    /// tokio's default task isolation for the readiness loop).
    pub fn spawn_background_tasks(&self) {
        spawn_supervised(Arc::clone(&self.health_monitor));
        tokio::spawn(Arc::clone(&self.readiness).run());
    }

    /// Build the [`AppState`](crate::api::AppState) this coordinator backs.
    #[must_use]
    pub fn app_state(&self) -> Arc<crate::api::AppState> {
        Arc::new(crate::api::AppState {
            registry: Arc::clone(&self.registry),
            dht: Some(Arc::clone(&self.dht)),
            auth_token: self.auth_token.clone(),
        })
    }
}
