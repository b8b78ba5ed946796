// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Worker agent (C4): orchestrates capability detection, tunnel creation,
//! coordinator registration, DHT join, heartbeat loop, and graceful
//! shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::distributed::capability;
use crate::distributed::dht::{Contact, DhtNode};
use crate::distributed::protocol::{
    DhtSeedDto, HeartbeatRequestDto, RegisterRequestDto, RegisterResponseDto, SeedsResponseDto,
};
use crate::distributed::tunnel::TunnelManager;
use crate::distributed::types::{CapabilityDescriptor, FabricError, Reachability, WorkerId};

const MAX_HEARTBEAT_FAILURES: u32 = 5;
const UNREGISTER_BUDGET: Duration = Duration::from_secs(10);
const SERVICE_RESTART_WINDOW: Duration = Duration::from_secs(60);

/// Configuration the worker agent needs to start up.
#[derive(Debug, Clone)]
pub struct WorkerAgentConfig {
    pub coordinator_url: String,
    pub declared_services: Vec<String>,
    pub service_port: u16,
    pub use_tunnel: bool,
    pub external_tunnel_url: Option<String>,
    pub dht_port: u16,
}

/// A locally supervised service subprocess.
struct ServiceChild {
    last_restart_at: Option<std::time::Instant>,
    restart_count_in_window: u32,
}

/// Runs a single worker's lifecycle: register, join the DHT, heartbeat,
/// supervise assigned services, and shut down cleanly on signal.
pub struct WorkerAgent {
    config: WorkerAgentConfig,
    http: reqwest::Client,
    worker_id: RwLock<Option<WorkerId>>,
    heartbeat_interval_s: RwLock<u64>,
    consecutive_failures: AtomicU32,
    tunnel: RwLock<Option<Arc<TunnelManager>>>,
    dht: RwLock<Option<Arc<DhtNode>>>,
    services: RwLock<HashMap<String, ServiceChild>>,
}

impl WorkerAgent {
    #[must_use]
    pub fn new(config: WorkerAgentConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            http: reqwest::Client::new(),
            worker_id: RwLock::new(None),
            heartbeat_interval_s: RwLock::new(30),
            consecutive_failures: AtomicU32::new(0),
            tunnel: RwLock::new(None),
            dht: RwLock::new(None),
            services: RwLock::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker_id.read().clone()
    }

    /// The DHT node this agent joined, once [`Self::start`] has completed
    /// successfully. Callers outside this crate (the peer discovery cache)
    /// use this to share the same node rather than opening a second one.
    #[must_use]
    pub fn dht(&self) -> Option<Arc<DhtNode>> {
        self.dht.read().clone()
    }

    /// Run the full startup sequence: capability detection, optional
    /// tunnel, coordinator registration, DHT join. Fatal failures abort
    /// with the matching [`FabricError`] variant.
    pub async fn start(self: &Arc<Self>) -> Result<(), FabricError> {
        // 1. Capability detection — failure is fatal.
        let capabilities = tokio::task::spawn_blocking(capability::detect_capabilities)
            .await
            .map_err(|e| FabricError::CapabilityFatal(e.to_string()))?;
        info!(
            cpu_cores = capabilities.cpu_cores,
            ram_gb = capabilities.ram_gb,
            has_gpu = capabilities.has_gpu,
            "capability detection complete"
        );

        // 2. Optional tunnel — retry <= 3 with 5s backoff; failure degrades.
        let tunnel = self.establish_tunnel().await;
        *self.tunnel.write() = tunnel.clone();

        // 3. Register with coordinator — retry <= 5 with 5s backoff.
        let reachability = Reachability {
            tunnel_url: tunnel.as_ref().and_then(|t| t.get_tunnel_url()),
            vpn_ip: None,
            public_ip: capabilities.public_ip.clone(),
        };
        let assignment = self.register_with_retry(&capabilities, &reachability, 5).await?;
        *self.worker_id.write() = Some(assignment.worker_id.clone());
        *self.heartbeat_interval_s.write() = assignment.heartbeat_interval;
        info!(worker_id = %assignment.worker_id, tier = %assignment.tier, "registered with coordinator");

        // 4. Join the DHT and publish declared services.
        self.join_dht(&assignment.worker_id, &reachability, &capabilities)
            .await;

        Ok(())
    }

    async fn establish_tunnel(&self) -> Option<Arc<TunnelManager>> {
        if let Some(url) = &self.config.external_tunnel_url {
            return Some(Arc::new(TunnelManager::external(url.clone())));
        }
        if !self.config.use_tunnel {
            return None;
        }
        for attempt in 1..=3 {
            match TunnelManager::create_tunnel(self.config.service_port, 30).await {
                Ok(manager) => return Some(manager),
                Err(err) => {
                    warn!(attempt, %err, "tunnel creation failed, degrading to direct-IP reachability");
                    if attempt < 3 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }
        None
    }

    async fn register_with_retry(
        &self,
        capabilities: &CapabilityDescriptor,
        reachability: &Reachability,
        max_attempts: u32,
    ) -> Result<RegisterResponseDto, FabricError> {
        let payload = RegisterRequestDto {
            capabilities: capabilities.clone(),
            services: self.config.declared_services.clone(),
            containers: Vec::new(),
            ip_address: reachability.vpn_ip.clone(),
            tunnel_url: reachability.tunnel_url.clone(),
        };

        let mut last_err = None;
        for attempt in 1..=max_attempts {
            let result = self
                .http
                .post(format!("{}/api/worker/register", self.config.coordinator_url))
                .json(&payload)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<RegisterResponseDto>()
                        .await
                        .map_err(|e| FabricError::RegistrationFatal(e.to_string()));
                }
                Ok(response) => {
                    last_err = Some(format!("coordinator returned {}", response.status()));
                }
                Err(err) => last_err = Some(err.to_string()),
            }
            warn!(attempt, max_attempts, error = ?last_err, "registration attempt failed");
            if attempt < max_attempts {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
        Err(FabricError::RegistrationFatal(
            last_err.unwrap_or_else(|| "unknown registration failure".to_string()),
        ))
    }

    async fn join_dht(
        &self,
        worker_id: &str,
        reachability: &Reachability,
        capabilities: &CapabilityDescriptor,
    ) {
        let seeds = self.fetch_seeds().await;
        let node = DhtNode::new("0.0.0.0", self.config.dht_port);
        node.bootstrap(seeds).await;

        let snapshot = crate::distributed::types::WorkerSnapshot {
            worker_id: worker_id.to_string(),
            tunnel_url: reachability.tunnel_url.clone(),
            vpn_ip: reachability.vpn_ip.clone(),
            services: self.config.declared_services.clone(),
            load: 0.0,
            last_seen: crate::distributed::types::now_unix(),
            capabilities: crate::distributed::types::SnapshotCapabilities {
                has_gpu: capabilities.has_gpu,
                gpu_memory_mb: capabilities.gpu_memory_mb,
            },
        };
        let value = serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null);
        node.put(&format!("worker:{worker_id}"), value, crate::distributed::dht::DEFAULT_TTL_S)
            .await;
        for service in &self.config.declared_services {
            node.put(
                &format!("service:{service}"),
                serde_json::json!([worker_id]),
                crate::distributed::dht::DEFAULT_TTL_S,
            )
            .await;
        }
        node.spawn_republish_task(crate::distributed::dht::DEFAULT_TTL_S);
        *self.dht.write() = Some(node);
    }

    async fn fetch_seeds(&self) -> Vec<Contact> {
        let url = format!("{}/api/dht/seeds", self.config.coordinator_url);
        match self.http.get(&url).send().await {
            Ok(response) => match response.json::<SeedsResponseDto>().await {
                Ok(seeds) => seeds.seeds.into_iter().filter_map(to_contact).collect(),
                Err(err) => {
                    warn!(%err, "failed to parse seed list, joining as genesis");
                    Vec::new()
                }
            },
            Err(err) => {
                warn!(%err, "failed to fetch DHT seeds, joining as genesis");
                Vec::new()
            }
        }
    }

    /// Run the heartbeat loop. Posts status every `heartbeat_interval_s`;
    /// after `MAX_HEARTBEAT_FAILURES` consecutive failures, re-runs the
    /// full startup sequence.
    pub async fn run_heartbeat_loop(self: &Arc<Self>) {
        loop {
            let interval = Duration::from_secs(*self.heartbeat_interval_s.read());
            tokio::time::sleep(interval).await;

            let Some(worker_id) = self.worker_id() else {
                continue;
            };
            let payload = HeartbeatRequestDto {
                worker_id: worker_id.clone(),
                status: Some("healthy".to_string()),
                current_load: 0.0,
                available_memory: 0.0,
                loaded_models: Vec::new(),
                active_requests: None,
                services_status: HashMap::new(),
                gpu_utilization: None,
                gpu_memory_used: None,
            };

            let result = self
                .http
                .post(format!("{}/api/worker/heartbeat", self.config.coordinator_url))
                .json(&payload)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                }
                _ => {
                    let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(failures, "heartbeat failed");
                    if failures >= MAX_HEARTBEAT_FAILURES {
                        warn!("max heartbeat failures reached, re-registering");
                        if let Err(err) = self.start().await {
                            error!(%err, "re-registration failed");
                        }
                        self.consecutive_failures.store(0, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    /// Record that `service` exited unexpectedly. Returns `true` if the
    /// service should be restarted, `false` if it should transition to
    /// `degraded` (two exits inside the restart window).
    pub fn record_service_exit(&self, service: &str) -> bool {
        let mut services = self.services.write();
        let entry = services.entry(service.to_string()).or_insert(ServiceChild {
            last_restart_at: None,
            restart_count_in_window: 0,
        });
        let now = std::time::Instant::now();
        let within_window = entry
            .last_restart_at
            .is_some_and(|t| now.duration_since(t) < SERVICE_RESTART_WINDOW);

        if within_window {
            entry.restart_count_in_window += 1;
        } else {
            entry.restart_count_in_window = 1;
        }
        entry.last_restart_at = Some(now);
        entry.restart_count_in_window <= 1
    }

    /// Graceful shutdown: best-effort unregister, stop the tunnel.
    pub async fn shutdown(&self) {
        if let Some(worker_id) = self.worker_id() {
            let url = format!(
                "{}/api/worker/unregister/{worker_id}",
                self.config.coordinator_url
            );
            let _ = tokio::time::timeout(UNREGISTER_BUDGET, self.http.delete(&url).send()).await;
        }
        if let Some(tunnel) = self.tunnel.read().clone() {
            tunnel.stop().await;
        }
    }
}

fn to_contact(seed: DhtSeedDto) -> Option<Contact> {
    Some(Contact {
        node_id: crate::distributed::dht::NodeId::from_hex(&seed.node_id)?,
        host: seed.host,
        port: seed.dht_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn agent() -> Arc<WorkerAgent> {
        WorkerAgent::new(WorkerAgentConfig {
            coordinator_url: "http://localhost:8000".to_string(),
            declared_services: vec!["ocr".to_string()],
            service_port: 9000,
            use_tunnel: false,
            external_tunnel_url: None,
            dht_port: 9100,
        })
    }

    #[test]
    fn first_exit_within_window_requests_restart() {
        let agent = agent();
        assert!(agent.record_service_exit("ocr"));
    }

    #[test]
    fn second_exit_within_window_requests_degraded() {
        let agent = agent();
        assert!(agent.record_service_exit("ocr"));
        assert!(!agent.record_service_exit("ocr"));
    }

    #[test]
    fn worker_id_is_none_before_registration() {
        let agent = agent();
        assert!(agent.worker_id().is_none());
    }

    fn agent_against(coordinator_url: String) -> Arc<WorkerAgent> {
        WorkerAgent::new(WorkerAgentConfig {
            coordinator_url,
            declared_services: vec!["ocr".to_string()],
            service_port: 9000,
            use_tunnel: false,
            external_tunnel_url: None,
            dht_port: 9101,
        })
    }

    #[tokio::test]
    async fn register_with_retry_succeeds_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/worker/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "worker_id": "w1",
                "tier": 2,
                "heartbeat_interval": 30
            })))
            .mount(&server)
            .await;

        let agent = agent_against(server.uri());
        let capabilities = CapabilityDescriptor {
            cpu_cores: 4,
            ram_gb: 8.0,
            storage_gb: 100.0,
            has_gpu: false,
            gpu_memory_mb: None,
            gpu_type: None,
            worker_type: None,
            public_ip: None,
        };
        let reachability = Reachability::default();
        let assignment = agent
            .register_with_retry(&capabilities, &reachability, 5)
            .await
            .expect("registration succeeds");
        assert_eq!(assignment.worker_id, "w1");
        assert_eq!(assignment.heartbeat_interval, 30);
    }

    #[tokio::test]
    async fn register_with_retry_exhausts_budget_on_persistent_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/worker/register"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let agent = agent_against(server.uri());
        let capabilities = CapabilityDescriptor {
            cpu_cores: 2,
            ram_gb: 4.0,
            storage_gb: 50.0,
            has_gpu: false,
            gpu_memory_mb: None,
            gpu_type: None,
            worker_type: None,
            public_ip: None,
        };
        let result = agent
            .register_with_retry(&capabilities, &Reachability::default(), 1)
            .await;
        assert!(matches!(result, Err(FabricError::RegistrationFatal(_))));
    }

    #[tokio::test]
    async fn fetch_seeds_falls_back_to_genesis_on_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dht/seeds"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let agent = agent_against(server.uri());
        let seeds = agent.fetch_seeds().await;
        assert!(seeds.is_empty());
    }
}
