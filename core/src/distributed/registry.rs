// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Coordinator-side worker registry (C5): the in-memory authoritative map of
//! registered workers, tiering, last-seen, and health transitions.

use super::types::{
    now_unix, CapabilityDescriptor, FabricError, Reachability, ServiceType, Tier, WorkerId,
    WorkerRecord, WorkerSnapshot, WorkerStatus,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default heartbeat interval handed to a newly registered worker, in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_S: u64 = 30;

/// Health monitor sweep interval.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(15);

/// Offline grace period before eviction.
pub const EVICTION_GRACE: Duration = Duration::from_secs(5 * 60);

/// Payload accepted by `register`.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    /// Capability descriptor reported by the worker.
    pub capabilities: CapabilityDescriptor,
    /// Reachability reported by the worker.
    pub reachability: Reachability,
    /// Declared services.
    pub services: Vec<ServiceType>,
    /// Optional caller-supplied worker id override.
    pub worker_id: Option<WorkerId>,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct RegisterAssignment {
    /// Assigned (or accepted) worker id.
    pub worker_id: WorkerId,
    /// Tier computed from the capability descriptor.
    pub tier: Tier,
    /// Heartbeat interval the worker should use.
    pub heartbeat_interval_s: u64,
}

/// Payload accepted by `heartbeat`.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatPayload {
    /// Current load, `[0.0, 1.0]`.
    pub current_load: f64,
    /// Available memory in gibibytes.
    pub available_memory_gb: f64,
}

/// Snapshot of worker counts, used by `/health`.
#[derive(Debug, Clone, Default)]
pub struct WorkerCounts {
    /// Total registered workers.
    pub total: usize,
    /// Count broken down by tier.
    pub by_tier: HashMap<u8, usize>,
    /// Count of workers currently `Online`.
    pub healthy: usize,
}

/// Coordinator-side worker registry.
///
/// Concurrency policy: a single `DashMap` gives independent per-key locking
/// for individual worker mutations (register / heartbeat / status
/// transition); listing operations iterate a consistent snapshot via
/// `DashMap::iter`, matching the "short write lock, read-lock snapshot for
/// listings" policy in the concurrency model.
#[derive(Clone)]
pub struct WorkerRegistry {
    workers: Arc<dashmap::DashMap<WorkerId, WorkerRecord>>,
    next_id: Arc<AtomicU64>,
    default_heartbeat_interval_s: u64,
}

impl WorkerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_heartbeat_interval(DEFAULT_HEARTBEAT_INTERVAL_S)
    }

    /// Create an empty registry with a non-default heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(default_heartbeat_interval_s: u64) -> Self {
        Self {
            workers: Arc::new(dashmap::DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            default_heartbeat_interval_s,
        }
    }

    /// Register a worker, computing its tier and storing a new record with
    /// status `Online`. `assigned_containers` (§6) is out of scope for this
    /// registry: this deployment model never pushes service assignments, so
    /// the response field is always empty and is represented at the API
    /// layer, not here.
    pub fn register(&self, req: RegisterRequest) -> Result<RegisterAssignment, FabricError> {
        if !req.capabilities.is_consistent() {
            return Err(FabricError::Validation(
                "has_gpu must agree with presence of gpu_memory_mb".to_string(),
            ));
        }

        let tier = req.capabilities.assign_tier();
        let worker_id = req.worker_id.unwrap_or_else(|| self.generate_id());
        let now = now_unix();

        let record = WorkerRecord {
            worker_id: worker_id.clone(),
            capabilities: req.capabilities,
            reachability: req.reachability,
            services: req.services.into_iter().collect(),
            tier,
            last_seen: now,
            load: 0.0,
            available_memory_gb: 0.0,
            status: WorkerStatus::Online,
            heartbeat_interval_s: self.default_heartbeat_interval_s,
            consecutive_heartbeat_failures: 0,
        };

        let heartbeat_interval_s = record.heartbeat_interval_s;
        self.workers.insert(worker_id.clone(), record);

        Ok(RegisterAssignment {
            worker_id,
            tier,
            heartbeat_interval_s,
        })
    }

    /// Ingest a heartbeat. `last_seen` is updated to `max(existing, now)` so
    /// that consecutive heartbeats for the same worker observe a
    /// monotonically non-decreasing timestamp even under reordering.
    pub fn heartbeat(
        &self,
        worker_id: &str,
        payload: HeartbeatPayload,
    ) -> Result<(), FabricError> {
        let mut entry = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| FabricError::NotRegistered(worker_id.to_string()))?;

        let now = now_unix();
        entry.last_seen = entry.last_seen.max(now);
        entry.load = payload.current_load.clamp(0.0, 1.0);
        entry.available_memory_gb = payload.available_memory_gb;
        entry.consecutive_heartbeat_failures = 0;
        if matches!(entry.status, WorkerStatus::Degraded | WorkerStatus::Offline) {
            entry.status = WorkerStatus::Online;
        }
        Ok(())
    }

    /// Remove a worker's record immediately.
    pub fn unregister(&self, worker_id: &str) {
        self.workers.remove(worker_id);
    }

    /// Fetch a copy of a worker's record.
    #[must_use]
    pub fn get(&self, worker_id: &str) -> Option<WorkerRecord> {
        self.workers.get(worker_id).map(|r| r.clone())
    }

    /// Total registered worker count.
    #[must_use]
    pub fn get_worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Worker count broken down by tier.
    #[must_use]
    pub fn get_worker_count_by_tier(&self) -> HashMap<u8, usize> {
        let mut counts = HashMap::new();
        for entry in &*self.workers {
            *counts.entry(entry.tier.as_u8()).or_insert(0) += 1;
        }
        counts
    }

    /// Count of workers currently `Online`.
    #[must_use]
    pub fn get_healthy_worker_count(&self) -> usize {
        self.workers.iter().filter(|e| e.is_available()).count()
    }

    /// Snapshot of all three counts in one call, matching the shape the
    /// `/health` endpoint serializes.
    #[must_use]
    pub fn worker_counts(&self) -> WorkerCounts {
        WorkerCounts {
            total: self.get_worker_count(),
            by_tier: self.get_worker_count_by_tier(),
            healthy: self.get_healthy_worker_count(),
        }
    }

    /// Snapshot of every registered worker record.
    #[must_use]
    pub fn list_workers(&self) -> Vec<WorkerRecord> {
        self.workers.iter().map(|e| e.clone()).collect()
    }

    /// Linear scan returning `online` workers whose declared services
    /// include `service_type`.
    #[must_use]
    pub fn find_workers_for_service(&self, service_type: &str) -> Vec<WorkerSnapshot> {
        self.workers
            .iter()
            .filter(|e| e.is_available() && e.services.contains(service_type))
            .map(|e| e.to_snapshot())
            .collect()
    }

    /// Run one health-monitor sweep: transition `online -> degraded`,
    /// `degraded -> offline`, and evict workers that have been offline past
    /// the grace window. Returns the ids evicted this sweep, for logging.
    pub fn sweep_health(&self) -> Vec<WorkerId> {
        let now = now_unix();
        let mut to_evict = Vec::new();

        for mut entry in self.workers.iter_mut() {
            let interval = entry.heartbeat_interval_s.max(1) as i64;
            let age = now - entry.last_seen;

            match entry.status {
                WorkerStatus::Online | WorkerStatus::Initializing if age > 4 * interval => {
                    entry.status = WorkerStatus::Offline;
                }
                WorkerStatus::Online if age > 2 * interval => {
                    entry.status = WorkerStatus::Degraded;
                }
                WorkerStatus::Degraded if age > 4 * interval => {
                    entry.status = WorkerStatus::Offline;
                }
                WorkerStatus::Degraded if age <= 2 * interval => {
                    entry.status = WorkerStatus::Online;
                }
                WorkerStatus::Offline if age > 4 * interval + EVICTION_GRACE.as_secs() as i64 => {
                    to_evict.push(entry.worker_id.clone());
                }
                _ => {}
            }
        }

        for id in &to_evict {
            self.workers.remove(id);
        }
        to_evict
    }

    fn generate_id(&self) -> WorkerId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("worker-{n:08x}")
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
