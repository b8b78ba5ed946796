// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Wire DTOs for the coordinator HTTP API and the DHT seed list. Each
//! request type rejects unknown fields so a malformed caller gets a 400
//! rather than silently dropped data.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::distributed::types::{
    CapabilityDescriptor, Reachability, ServiceType, Tier, WorkerId, WorkerSnapshot,
};

/// `POST /api/worker/register` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequestDto {
    /// Detected worker capabilities.
    pub capabilities: CapabilityDescriptor,
    /// Service types this worker can run.
    #[serde(default)]
    pub services: Vec<ServiceType>,
    /// Containers already running, reported back as `assigned_containers`.
    #[serde(default)]
    pub containers: Vec<String>,
    /// Reachability the worker can offer the coordinator.
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub tunnel_url: Option<String>,
}

impl RegisterRequestDto {
    /// Build the `Reachability` the registry expects out of the loose
    /// top-level fields the wire format uses.
    #[must_use]
    pub fn reachability(&self) -> Reachability {
        Reachability {
            tunnel_url: self.tunnel_url.clone(),
            vpn_ip: self.ip_address.clone(),
            public_ip: self.capabilities.public_ip.clone(),
        }
    }
}

/// `POST /api/worker/register` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponseDto {
    pub worker_id: WorkerId,
    pub tier: Tier,
    pub heartbeat_interval: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_containers: Option<Vec<String>>,
}

/// `POST /api/worker/heartbeat` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatRequestDto {
    pub worker_id: WorkerId,
    #[serde(default)]
    pub status: Option<String>,
    pub current_load: f64,
    pub available_memory: f64,
    #[serde(default)]
    pub loaded_models: Vec<String>,
    #[serde(default)]
    pub active_requests: Option<u32>,
    #[serde(default)]
    pub services_status: HashMap<ServiceType, String>,
    #[serde(default)]
    pub gpu_utilization: Option<f64>,
    #[serde(default)]
    pub gpu_memory_used: Option<u64>,
}

/// Plain `{ok: true}` envelope shared by heartbeat, unregister and other
/// acknowledgement-only responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    #[must_use]
    pub const fn ok() -> Self {
        Self { ok: true }
    }
}

/// `GET /api/admin/workers` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListWorkersResponseDto {
    pub workers: Vec<WorkerSnapshot>,
}

/// Per-tier worker counts embedded in `GET /health`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerCountsDto {
    pub total: usize,
    pub by_tier: HashMap<String, usize>,
    pub healthy: usize,
}

/// `GET /health` response body, both coordinator and worker-local variants
/// share this envelope: the worker fills `services` instead of `workers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponseDto {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<WorkerCountsDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<HashMap<ServiceType, String>>,
}

/// One DHT bootstrap seed entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhtSeedDto {
    pub node_id: String,
    pub host: String,
    pub dht_port: u16,
}

/// `GET /api/dht/seeds` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedsResponseDto {
    pub seeds: Vec<DhtSeedDto>,
    pub ttl: u64,
}

/// `POST /service/{type}` request body on a worker: opaque, forwarded
/// verbatim to the local service handler.
pub type ServiceRequestBody = serde_json::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_rejects_unknown_fields() {
        let raw = serde_json::json!({
            "capabilities": {
                "cpu_cores": 4,
                "ram_gb": 8.0,
                "storage_gb": 100.0,
                "has_gpu": false
            },
            "bogus_field": true
        });
        let result: Result<RegisterRequestDto, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }

    #[test]
    fn reachability_prefers_explicit_fields_over_capability_public_ip() {
        let dto = RegisterRequestDto {
            capabilities: CapabilityDescriptor {
                cpu_cores: 1,
                ram_gb: 1.0,
                storage_gb: 1.0,
                has_gpu: false,
                gpu_memory_mb: None,
                gpu_type: None,
                worker_type: None,
                public_ip: Some("203.0.113.1".to_string()),
            },
            services: vec![],
            containers: vec![],
            ip_address: Some("10.8.0.5".to_string()),
            tunnel_url: None,
        };
        let reachability = dto.reachability();
        assert_eq!(reachability.vpn_ip.as_deref(), Some("10.8.0.5"));
        assert_eq!(reachability.public_ip.as_deref(), Some("203.0.113.1"));
    }

    #[test]
    fn ok_response_serializes_true() {
        let json = serde_json::to_value(OkResponse::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true}));
    }
}
