// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Request router (C6): local dispatch, finger cache, DHT/registry
//! discovery, VPN-preferred selection, and forward-with-fallback.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::seq::SliceRandom;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::distributed::dht::DhtNode;
use crate::distributed::registry::WorkerRegistry;
use crate::distributed::types::{FabricError, ServiceType, WorkerId, WorkerSnapshot};

const FINGER_CACHE_TTL: Duration = Duration::from_secs(60);
const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);
const SELECTION_TOP_N: usize = 3;
/// Per-remote-worker outbound concurrency limit.
const MAX_OUTBOUND_PER_WORKER: usize = 16;
/// Budget a caller waits for a free outbound slot before failing `Busy`.
const OUTBOUND_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

struct FingerEntry {
    snapshot: WorkerSnapshot,
    cached_at: Instant,
}

impl FingerEntry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > FINGER_CACHE_TTL
    }
}

/// Observable counters for the router, exposed on demand.
#[derive(Debug, Default)]
pub struct RouterStats {
    pub local_requests: AtomicU64,
    pub forwarded_requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub dht_lookups: AtomicU64,
    pub failures: AtomicU64,
}

/// Snapshot of [`RouterStats`] suitable for serialization.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RouterStatsSnapshot {
    pub local_requests: u64,
    pub forwarded_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub dht_lookups: u64,
    pub failures: u64,
}

/// Per-worker request router. Each worker runs one instance scoped to the
/// service types it handles locally.
pub struct RequestRouter {
    local_services: HashSet<ServiceType>,
    finger_cache: DashMap<ServiceType, FingerEntry>,
    dht: Option<Arc<DhtNode>>,
    registry_fallback: Option<Arc<WorkerRegistry>>,
    http: reqwest::Client,
    stats: RouterStats,
    outbound_limits: DashMap<WorkerId, Arc<Semaphore>>,
    peer_source: Option<Arc<dyn PeerSource>>,
}

impl RequestRouter {
    #[must_use]
    pub fn new(local_services: HashSet<ServiceType>) -> Self {
        Self {
            local_services,
            finger_cache: DashMap::new(),
            dht: None,
            registry_fallback: None,
            http: reqwest::Client::builder()
                .timeout(FORWARD_TIMEOUT)
                .build()
                .expect("reqwest client builds"),
            stats: RouterStats::default(),
            outbound_limits: DashMap::new(),
            peer_source: None,
        }
    }

    #[must_use]
    pub fn with_dht(mut self, dht: Arc<DhtNode>) -> Self {
        self.dht = Some(dht);
        self
    }

    #[must_use]
    pub fn with_registry_fallback(mut self, registry: Arc<WorkerRegistry>) -> Self {
        self.registry_fallback = Some(registry);
        self
    }

    /// Widen discovery with a last-resort candidate source, consulted only
    /// when the DHT and the registry fallback both come up empty.
    #[must_use]
    pub fn with_peer_source(mut self, source: Arc<dyn PeerSource>) -> Self {
        self.peer_source = Some(source);
        self
    }

    /// Resolve `service_type`, returning `Local` when this worker handles
    /// it in-process, otherwise forwarding the raw `body` to the chosen
    /// remote worker and returning its response body.
    pub async fn route(
        &self,
        service_type: &str,
        body: serde_json::Value,
    ) -> Result<RouteOutcome, FabricError> {
        if self.local_services.contains(service_type) {
            self.stats.local_requests.fetch_add(1, Ordering::Relaxed);
            return Ok(RouteOutcome::Local);
        }

        if let Some(entry) = self.finger_cache.get(service_type) {
            if !entry.is_expired() {
                let snapshot = entry.snapshot.clone();
                drop(entry);
                match self.forward(&snapshot, service_type, &body).await {
                    Ok(response) => {
                        self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                        self.stats.forwarded_requests.fetch_add(1, Ordering::Relaxed);
                        return Ok(RouteOutcome::Forwarded(response));
                    }
                    Err(_) => {
                        self.finger_cache.remove(service_type);
                    }
                }
            } else {
                self.finger_cache.remove(service_type);
            }
        }
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let candidates = self.discover(service_type).await?;
        if candidates.is_empty() {
            return Err(FabricError::ServiceNotFound(service_type.to_string()));
        }

        let chosen = select_worker(&candidates).ok_or_else(|| {
            FabricError::ServiceNotFound(service_type.to_string())
        })?;

        self.finger_cache.insert(
            service_type.to_string(),
            FingerEntry {
                snapshot: chosen.clone(),
                cached_at: Instant::now(),
            },
        );

        match self.forward(&chosen, service_type, &body).await {
            Ok(response) => {
                self.stats.forwarded_requests.fetch_add(1, Ordering::Relaxed);
                Ok(RouteOutcome::Forwarded(response))
            }
            Err(first_err) => {
                // One retry against the next-best candidate, bypassing cache.
                if let Some(alt) = candidates.iter().find(|c| c.worker_id != chosen.worker_id) {
                    match self.forward(alt, service_type, &body).await {
                        Ok(response) => {
                            self.stats.forwarded_requests.fetch_add(1, Ordering::Relaxed);
                            Ok(RouteOutcome::Forwarded(response))
                        }
                        Err(_) => {
                            self.stats.failures.fetch_add(1, Ordering::Relaxed);
                            Err(first_err)
                        }
                    }
                } else {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    Err(first_err)
                }
            }
        }
    }

    async fn discover(&self, service_type: &str) -> Result<Vec<WorkerSnapshot>, FabricError> {
        if let Some(dht) = &self.dht {
            self.stats.dht_lookups.fetch_add(1, Ordering::Relaxed);
            let found = dht.find_service_workers(service_type).await;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        if let Some(registry) = &self.registry_fallback {
            let found = registry.find_workers_for_service(service_type);
            if !found.is_empty() {
                return Ok(found);
            }
        }
        if let Some(peers) = &self.peer_source {
            return Ok(peers.peers_for_service(service_type));
        }
        Ok(Vec::new())
    }

    fn outbound_semaphore(&self, worker_id: &str) -> Arc<Semaphore> {
        Arc::clone(
            &self
                .outbound_limits
                .entry(worker_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(MAX_OUTBOUND_PER_WORKER))),
        )
    }

    async fn forward(
        &self,
        worker: &WorkerSnapshot,
        service_type: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, FabricError> {
        let semaphore = self.outbound_semaphore(&worker.worker_id);
        let _permit = tokio::time::timeout(OUTBOUND_ACQUIRE_TIMEOUT, semaphore.acquire_owned())
            .await
            .map_err(|_| FabricError::Busy)?
            .map_err(|_| FabricError::Busy)?;

        if let Some(vpn_ip) = &worker.vpn_ip {
            let url = format!("http://{vpn_ip}:8000/service/{service_type}");
            if let Ok(response) = self.try_forward(&url, body).await {
                return Ok(response);
            }
        }
        if let Some(tunnel_url) = &worker.tunnel_url {
            let url = format!("{tunnel_url}/service/{service_type}");
            return self.try_forward(&url, body).await;
        }
        Err(FabricError::RequestForwardingError(format!(
            "worker {} has no usable reachability",
            worker.worker_id
        )))
    }

    async fn try_forward(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, FabricError> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| FabricError::RequestForwardingError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FabricError::RequestForwardingError(format!(
                "upstream returned {}",
                response.status()
            )));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| FabricError::RequestForwardingError(e.to_string()))
    }

    /// Service types this worker handles in-process, as declared at
    /// construction. Exposed for the worker-local `/health` endpoint's
    /// service-status map.
    #[must_use]
    pub fn local_services(&self) -> &HashSet<ServiceType> {
        &self.local_services
    }

    #[must_use]
    pub fn stats(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            local_requests: self.stats.local_requests.load(Ordering::Relaxed),
            forwarded_requests: self.stats.forwarded_requests.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            dht_lookups: self.stats.dht_lookups.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
        }
    }
}

/// Last-resort candidate source consulted only when both the DHT and the
/// registry fallback return nothing: the worker-local peer discovery cache
/// (C8) implements this in `coord-fabric-peers`, which depends on this
/// crate and so cannot be referenced here by name.
pub trait PeerSource: Send + Sync {
    /// Every peer this source currently believes offers `service_type`.
    fn peers_for_service(&self, service_type: &str) -> Vec<WorkerSnapshot>;
}

/// Outcome of routing a single request.
pub enum RouteOutcome {
    /// Handle in-process; the caller dispatches to its own local handler.
    Local,
    /// The remote worker's JSON response body.
    Forwarded(serde_json::Value),
}

/// Partition into VPN-reachable and tunnel-only, prefer the VPN partition
/// if non-empty; sort ascending by load; take the top `min(3, n)`; pick
/// uniformly at random among those.
fn select_worker(candidates: &[WorkerSnapshot]) -> Option<WorkerSnapshot> {
    let (vpn, tunnel_only): (Vec<_>, Vec<_>) = candidates
        .iter()
        .cloned()
        .partition(|c| c.vpn_ip.is_some());
    let mut pool = if !vpn.is_empty() { vpn } else { tunnel_only };
    if pool.is_empty() {
        return None;
    }
    pool.sort_by(|a, b| a.load.partial_cmp(&b.load).unwrap_or(std::cmp::Ordering::Equal));
    pool.truncate(SELECTION_TOP_N.min(pool.len()));
    pool.choose(&mut rand::thread_rng()).cloned()
}
