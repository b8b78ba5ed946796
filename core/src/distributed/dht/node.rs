// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Kademlia-style DHT node (C1): `put`/`get`/`find_service_workers`,
//! iterative lookups, and republish-on-timer for owned keys.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::distributed::types::{now_unix, FabricError, WorkerSnapshot};

use super::kbucket::{Contact, NodeId, RoutingTable, K};
use super::rpc::{
    new_txn_id, FindNodeRequest, FindNodeResponse, FindValueRequest, FindValueResponse,
    PingRequest, PingResponse, StoreRequest, StoreResponse, UnsupportedResponse,
    DHT_PROTOCOL_VERSION,
};

/// Lookup concurrency (Kademlia's alpha).
const ALPHA: usize = 3;
/// Default record TTL, matching the worker record republish cadence.
pub const DEFAULT_TTL_S: u64 = 300;
/// Network round-trip budget for a single RPC.
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

struct StoredRecord {
    value: serde_json::Value,
    stored_at: i64,
    ttl_s: u64,
}

/// A key this node is the publisher of, republished every `ttl/3` until
/// withdrawn.
struct OwnedKey {
    value: serde_json::Value,
    ttl_s: u64,
}

/// One DHT participant: routing table, local value store, and the set of
/// keys it owns and must keep republishing.
pub struct DhtNode {
    local: Contact,
    routing_table: RoutingTable,
    store: DashMap<String, StoredRecord>,
    owned: DashMap<String, OwnedKey>,
    http: reqwest::Client,
}

impl DhtNode {
    /// Create a node bound to `host:port`, generating a fresh random id.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Arc<Self> {
        let node_id = NodeId::random();
        let local = Contact {
            node_id,
            host: host.into(),
            port,
        };
        Arc::new(Self {
            routing_table: RoutingTable::new(node_id),
            local,
            store: DashMap::new(),
            owned: DashMap::new(),
            http: reqwest::Client::builder()
                .timeout(RPC_TIMEOUT)
                .build()
                .expect("reqwest client builds"),
        })
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.local.node_id
    }

    #[must_use]
    pub fn contact(&self) -> Contact {
        self.local.clone()
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.routing_table.peer_count()
    }

    /// Join the overlay via `seeds`. An empty seed list means this node is
    /// its own genesis.
    pub async fn bootstrap(self: &Arc<Self>, seeds: Vec<Contact>) {
        if seeds.is_empty() {
            info!(node_id = %self.local.node_id, "DHT node bootstrapping as genesis (no seeds)");
            return;
        }
        for seed in seeds {
            match self.ping(&seed).await {
                Ok(()) => self.routing_table.observe(seed),
                Err(err) => warn!(%err, host = %seed.host, port = seed.port, "seed ping failed"),
            }
        }
        let target = self.local.node_id;
        self.iterative_find_node(target).await;
    }

    /// Ping a contact; success also registers it in the routing table.
    pub async fn ping(&self, contact: &Contact) -> Result<(), FabricError> {
        let request = PingRequest {
            from: self.local.clone(),
            txn_id: new_txn_id(),
            version: DHT_PROTOCOL_VERSION,
        };
        let response: PingResponse = self
            .post(contact, "ping", &request)
            .await
            .map_err(|e| FabricError::TransientNetwork(e.to_string()))?;
        if response.node_id == contact.node_id {
            self.routing_table.observe(contact.clone());
            Ok(())
        } else {
            Err(FabricError::TransientNetwork("node id mismatch on ping".to_string()))
        }
    }

    async fn post<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        contact: &Contact,
        rpc: &str,
        body: &Req,
    ) -> Result<Resp, reqwest::Error> {
        self.http
            .post(format!("{}/dht/{rpc}", contact.base_url()))
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json::<Resp>()
            .await
    }

    /// Standard Kademlia iterative node lookup: repeatedly query the
    /// alpha-closest not-yet-queried contacts until no closer contact is
    /// discovered.
    pub async fn iterative_find_node(&self, target: NodeId) -> Vec<Contact> {
        let mut queried: HashSet<NodeId> = HashSet::new();
        let mut shortlist = self.routing_table.closest(&target, K);

        loop {
            let candidates: Vec<Contact> = shortlist
                .iter()
                .filter(|c| !queried.contains(&c.node_id))
                .take(ALPHA)
                .cloned()
                .collect();
            if candidates.is_empty() {
                break;
            }

            let mut discovered = Vec::new();
            for contact in &candidates {
                queried.insert(contact.node_id);
                let request = FindNodeRequest {
                    from: self.local.clone(),
                    target,
                    txn_id: new_txn_id(),
                    version: DHT_PROTOCOL_VERSION,
                };
                match self.post::<_, FindNodeResponse>(contact, "find_node", &request).await {
                    Ok(response) => {
                        self.routing_table.observe(contact.clone());
                        discovered.extend(response.contacts);
                    }
                    Err(err) => {
                        debug!(%err, peer = %contact.node_id, "find_node RPC failed");
                        self.routing_table.remove(&contact.node_id);
                    }
                }
            }

            let before_closest = shortlist.first().map(|c| c.node_id.distance(&target));
            for contact in discovered {
                if contact.node_id != self.local.node_id
                    && !shortlist.iter().any(|c| c.node_id == contact.node_id)
                {
                    shortlist.push(contact);
                }
            }
            shortlist.sort_by_key(|c| c.node_id.distance(&target));
            shortlist.truncate(K);
            let after_closest = shortlist.first().map(|c| c.node_id.distance(&target));

            if before_closest == after_closest && queried.len() >= shortlist.len() {
                break;
            }
        }

        shortlist
    }

    /// Write `value` under `key` to the k closest nodes (and locally, if
    /// this node is among them), tracking it as owned for republish.
    pub async fn put(self: &Arc<Self>, key: &str, value: serde_json::Value, ttl_s: u64) -> usize {
        self.owned.insert(
            key.to_string(),
            OwnedKey {
                value: value.clone(),
                ttl_s,
            },
        );
        self.replicate(key, value, ttl_s).await
    }

    async fn replicate(&self, key: &str, value: serde_json::Value, ttl_s: u64) -> usize {
        let target = NodeId::from_key(key);
        let mut targets = self.iterative_find_node(target).await;

        let self_distance = self.local.node_id.distance(&target);
        if targets.len() < K || targets.last().map_or(true, |c| c.node_id.distance(&target) > self_distance) {
            self.store.insert(
                key.to_string(),
                StoredRecord {
                    value: value.clone(),
                    stored_at: now_unix(),
                    ttl_s,
                },
            );
        }

        targets.truncate(K);
        let mut acks = 0usize;
        for contact in &targets {
            let request = StoreRequest {
                from: self.local.clone(),
                key: key.to_string(),
                value: value.clone(),
                ttl_s,
                publisher: self.local.node_id,
                txn_id: new_txn_id(),
                version: DHT_PROTOCOL_VERSION,
            };
            match self.post::<_, StoreResponse>(contact, "store", &request).await {
                Ok(resp) if resp.ack => acks += 1,
                Ok(_) => {}
                Err(err) => debug!(%err, peer = %contact.node_id, "store RPC failed"),
            }
        }
        acks
    }

    /// Read `key`: local store first, then an iterative `find_value` over
    /// the network. Not found is not an error.
    pub async fn get(&self, key: &str) -> Option<(serde_json::Value, i64)> {
        if let Some(record) = self.store.get(key) {
            return Some((record.value.clone(), record.stored_at));
        }
        self.iterative_find_value(key).await
    }

    async fn iterative_find_value(&self, key: &str) -> Option<(serde_json::Value, i64)> {
        let target = NodeId::from_key(key);
        let mut queried: HashSet<NodeId> = HashSet::new();
        let mut shortlist = self.routing_table.closest(&target, K);

        loop {
            let candidates: Vec<Contact> = shortlist
                .iter()
                .filter(|c| !queried.contains(&c.node_id))
                .take(ALPHA)
                .cloned()
                .collect();
            if candidates.is_empty() {
                return None;
            }

            for contact in &candidates {
                queried.insert(contact.node_id);
                let request = FindValueRequest {
                    from: self.local.clone(),
                    key: key.to_string(),
                    txn_id: new_txn_id(),
                    version: DHT_PROTOCOL_VERSION,
                };
                match self.post::<_, FindValueResponse>(contact, "find_value", &request).await {
                    Ok(FindValueResponse::Found { value, last_seen, .. }) => {
                        self.routing_table.observe(contact.clone());
                        return Some((value, last_seen));
                    }
                    Ok(FindValueResponse::NotFound { contacts, .. }) => {
                        self.routing_table.observe(contact.clone());
                        for c in contacts {
                            if c.node_id != self.local.node_id
                                && !shortlist.iter().any(|existing| existing.node_id == c.node_id)
                            {
                                shortlist.push(c);
                            }
                        }
                    }
                    Err(err) => {
                        debug!(%err, peer = %contact.node_id, "find_value RPC failed");
                        self.routing_table.remove(&contact.node_id);
                    }
                }
            }
            shortlist.sort_by_key(|c| c.node_id.distance(&target));
            shortlist.truncate(K);
        }
    }

    /// `service:<type>` lists worker ids; each `worker:<id>` is fetched in
    /// parallel and filtered by TTL freshness, per the component contract.
    pub async fn find_service_workers(&self, service_type: &str) -> Vec<WorkerSnapshot> {
        let Some((list_value, _)) = self.get(&format!("service:{service_type}")).await else {
            return Vec::new();
        };
        let worker_ids: Vec<String> = serde_json::from_value(list_value).unwrap_or_default();

        let mut snapshots = Vec::new();
        let futures: Vec<_> = worker_ids
            .iter()
            .map(|id| self.get(&format!("worker:{id}")))
            .collect();
        let results = futures::future::join_all(futures).await;

        for result in results {
            if let Some((value, _)) = result {
                if let Ok(snapshot) = serde_json::from_value::<WorkerSnapshot>(value) {
                    let age = now_unix() - snapshot.last_seen;
                    if age <= DEFAULT_TTL_S as i64 {
                        snapshots.push(snapshot);
                    }
                }
            }
        }
        snapshots
    }

    /// Withdraw an owned key: stop republishing it locally. Does not
    /// attempt to delete replicas (best-effort expiry via TTL instead).
    pub fn withdraw(&self, key: &str) {
        self.owned.remove(key);
        self.store.remove(key);
    }

    /// Republish every owned key once. Intended to be called on a
    /// `ttl/3` timer per key by the caller's maintenance loop; returns the
    /// keys whose replication fell below `k/2` acknowledgements so the
    /// caller can apply backoff before retrying them.
    pub async fn republish_all(self: &Arc<Self>) -> Vec<String> {
        let owned: Vec<(String, serde_json::Value, u64)> = self
            .owned
            .iter()
            .map(|entry| (entry.key().clone(), entry.value.value.clone(), entry.value.ttl_s))
            .collect();

        let mut under_replicated = Vec::new();
        for (key, value, ttl_s) in owned {
            let acks = self.replicate(&key, value, ttl_s).await;
            if acks < K / 2 {
                under_replicated.push(key);
            }
        }
        under_replicated
    }

    /// Spawn the republish maintenance task: every `ttl/3`, republish all
    /// owned keys; any key that lands below `k/2` acknowledgements is
    /// retried immediately with capped exponential backoff (1s, 2s, 4s,
    /// 30s) before the next full cycle.
    pub fn spawn_republish_task(self: &Arc<Self>, ttl_s: u64) -> tokio::task::JoinHandle<()> {
        let node = Arc::clone(self);
        let cycle = Duration::from_secs((ttl_s / 3).max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cycle);
            loop {
                ticker.tick().await;
                let under_replicated = node.republish_all().await;
                for key in under_replicated {
                    node.retry_with_backoff(&key).await;
                }
            }
        })
    }

    async fn retry_with_backoff(self: &Arc<Self>, key: &str) {
        const BACKOFFS_S: [u64; 4] = [1, 2, 4, 30];
        for delay in BACKOFFS_S {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            let Some(owned) = self.owned.get(key) else {
                return;
            };
            let (value, ttl_s) = (owned.value.clone(), owned.ttl_s);
            drop(owned);
            let acks = self.replicate(key, value, ttl_s).await;
            if acks >= K / 2 {
                return;
            }
        }
        warn!(key, "republish still under-replicated after backoff schedule");
    }

    /// axum router exposing the four DHT RPCs at `/dht/{ping,find_node,find_value,store}`,
    /// with every other `/dht/*` path answering `UNSUPPORTED`.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/dht/ping", post(handle_ping))
            .route("/dht/find_node", post(handle_find_node))
            .route("/dht/find_value", post(handle_find_value))
            .route("/dht/store", post(handle_store))
            .fallback(handle_unsupported)
            .with_state(Arc::clone(self))
    }
}

async fn handle_ping(
    State(node): State<Arc<DhtNode>>,
    Json(request): Json<PingRequest>,
) -> Json<PingResponse> {
    node.routing_table.observe(request.from);
    Json(PingResponse {
        node_id: node.local.node_id,
        txn_id: request.txn_id,
        version: DHT_PROTOCOL_VERSION,
    })
}

async fn handle_find_node(
    State(node): State<Arc<DhtNode>>,
    Json(request): Json<FindNodeRequest>,
) -> Json<FindNodeResponse> {
    node.routing_table.observe(request.from);
    let contacts = node.routing_table.closest(&request.target, K);
    Json(FindNodeResponse {
        contacts,
        txn_id: request.txn_id,
        version: DHT_PROTOCOL_VERSION,
    })
}

async fn handle_find_value(
    State(node): State<Arc<DhtNode>>,
    Json(request): Json<FindValueRequest>,
) -> Json<FindValueResponse> {
    node.routing_table.observe(request.from);
    if let Some(record) = node.store.get(&request.key) {
        Json(FindValueResponse::Found {
            value: record.value.clone(),
            last_seen: record.stored_at,
            txn_id: request.txn_id,
            version: DHT_PROTOCOL_VERSION,
        })
    } else {
        let contacts = node.routing_table.closest(&NodeId::from_key(&request.key), K);
        Json(FindValueResponse::NotFound {
            contacts,
            txn_id: request.txn_id,
            version: DHT_PROTOCOL_VERSION,
        })
    }
}

async fn handle_store(
    State(node): State<Arc<DhtNode>>,
    Json(request): Json<StoreRequest>,
) -> Json<StoreResponse> {
    node.routing_table.observe(request.from);
    node.store.insert(
        request.key,
        StoredRecord {
            value: request.value,
            stored_at: now_unix(),
            ttl_s: request.ttl_s,
        },
    );
    Json(StoreResponse {
        ack: true,
        txn_id: request.txn_id,
        version: DHT_PROTOCOL_VERSION,
    })
}

async fn handle_unsupported() -> Json<UnsupportedResponse> {
    Json(UnsupportedResponse::default())
}
