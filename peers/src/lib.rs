// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Peer discovery cache (C8): a worker-local background sweep of the DHT
//! across a fixed set of service types, maintaining a short-lived peer
//! directory independent of the router's finger cache.
//!
//! Distinct from the finger cache: the finger cache remembers *one*
//! worker per service for the most recent forward. This cache remembers
//! *all* peers seen per service over a longer horizon, widening the
//! router's candidate pool when the DHT and registry both come up empty.
//! It never originates a forward on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use coord_fabric_core::distributed::dht::DhtNode;
use coord_fabric_core::distributed::router::PeerSource;
use coord_fabric_core::distributed::types::{now_unix, ServiceType, WorkerId, WorkerSnapshot};

/// Default sweep interval.
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);

/// Default staleness horizon for [`PeerDiscovery::clear_stale`].
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// Service types swept on every discovery round.
const DEFAULT_SERVICE_TYPES: &[&str] =
    &["ocr", "enhance", "chat", "embedding", "ner", "storage"];

struct PeerEntry {
    snapshot: WorkerSnapshot,
    last_seen: i64,
}

/// Worker-local peer directory, populated by repeated `find_service_workers`
/// calls against a shared [`DhtNode`].
pub struct PeerDiscovery {
    dht: Arc<DhtNode>,
    service_types: Vec<ServiceType>,
    known_peers: DashMap<WorkerId, PeerEntry>,
}

impl PeerDiscovery {
    /// Build a cache over the fabric's default service type list.
    #[must_use]
    pub fn new(dht: Arc<DhtNode>) -> Self {
        Self::with_service_types(
            dht,
            DEFAULT_SERVICE_TYPES.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    /// Build a cache swept over an explicit set of service types.
    #[must_use]
    pub fn with_service_types(dht: Arc<DhtNode>, service_types: Vec<ServiceType>) -> Self {
        Self {
            dht,
            service_types,
            known_peers: DashMap::new(),
        }
    }

    /// Run one discovery round: query the DHT for every configured service
    /// type and merge results into the known-peer map.
    pub async fn discover_peers(&self) {
        for service_type in &self.service_types {
            let workers = self.dht.find_service_workers(service_type).await;
            for worker in workers {
                self.known_peers.insert(
                    worker.worker_id.clone(),
                    PeerEntry {
                        snapshot: worker,
                        last_seen: now_unix(),
                    },
                );
            }
        }
        debug!(peers = self.known_peers.len(), "peer discovery round complete");
    }

    /// Spawn the background discovery loop at `interval`, returning its
    /// join handle. The caller holds the handle and aborts it on shutdown;
    /// there is no separate `stop()` — aborting the task is cooperative
    /// cancellation at the tokio layer.
    #[must_use]
    pub fn start(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            info!(?interval, "starting peer discovery loop");
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.discover_peers().await;
                this.clear_stale(DEFAULT_MAX_AGE);
            }
        })
    }

    /// Snapshot of every known peer offering `service_type`.
    #[must_use]
    pub fn peers_for_service(&self, service_type: &str) -> Vec<WorkerSnapshot> {
        self.known_peers
            .iter()
            .filter(|e| e.snapshot.services.iter().any(|s| s == service_type))
            .map(|e| e.snapshot.clone())
            .collect()
    }

    /// Every known peer, keyed by worker id.
    #[must_use]
    pub fn all_peers(&self) -> HashMap<WorkerId, WorkerSnapshot> {
        self.known_peers
            .iter()
            .map(|e| (e.key().clone(), e.snapshot.clone()))
            .collect()
    }

    /// Count of distinct known peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.known_peers.len()
    }

    /// Drop entries whose `last_seen` is older than `max_age`.
    pub fn clear_stale(&self, max_age: Duration) {
        let cutoff = now_unix() - max_age.as_secs() as i64;
        let stale: Vec<WorkerId> = self
            .known_peers
            .iter()
            .filter(|e| e.last_seen < cutoff)
            .map(|e| e.key().clone())
            .collect();
        for id in &stale {
            self.known_peers.remove(id);
        }
        if !stale.is_empty() {
            warn!(count = stale.len(), "pruned stale peers");
        }
    }
}

impl PeerSource for PeerDiscovery {
    fn peers_for_service(&self, service_type: &str) -> Vec<WorkerSnapshot> {
        self.peers_for_service(service_type)
    }
}
