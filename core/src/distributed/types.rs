// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Core data types for the worker coordination fabric: identities, capability
//! descriptors, worker records, and the error taxonomy shared across the
//! registry, router, and DHT.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Stable worker identity, assigned (or accepted) at registration.
pub type WorkerId = String;

/// Short string tag identifying a capability, e.g. `"ocr"`, `"llm-inference"`.
pub type ServiceType = String;

/// Errors shared across the fabric's components. Individual components
/// (DHT, tunnel manager, router) define narrower error types of their own;
/// this enum collects the kinds named in the error taxonomy that cross a
/// component boundary and therefore need a stable, typed shape.
#[derive(Error, Debug)]
pub enum FabricError {
    /// A network operation failed but is safe to retry with backoff.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Heartbeat (or any operation keyed by worker id) referenced an id the
    /// registry does not know about. The caller must re-register.
    #[error("worker not registered: {0}")]
    NotRegistered(WorkerId),

    /// No worker could be found for the requested service type.
    #[error("no worker provides service: {0}")]
    ServiceNotFound(ServiceType),

    /// Both VPN and tunnel forwarding paths failed.
    #[error("request forwarding failed: {0}")]
    RequestForwardingError(String),

    /// Host capability inspection failed; fatal to the worker agent (exit 2).
    #[error("capability detection failed: {0}")]
    CapabilityFatal(String),

    /// Coordinator refused registration after the retry budget was spent;
    /// fatal to the worker agent (exit 1).
    #[error("registration failed: {0}")]
    RegistrationFatal(String),

    /// The tunnel child process could not be launched.
    #[error("tunnel unavailable: {0}")]
    TunnelUnavailable(String),

    /// The tunnel child process did not report a URL before the deadline.
    #[error("tunnel creation timed out after {0:?}")]
    TunnelTimeout(std::time::Duration),

    /// Router exhausted its outbound concurrency budget for a worker.
    #[error("busy: outbound concurrency limit reached")]
    Busy,

    /// Payload failed validation (unknown field, out-of-range value, ...).
    #[error("invalid request: {0}")]
    Validation(String),

    /// Bearer token missing or incorrect.
    #[error("unauthorized")]
    Unauthorized,
}

/// Coarse capability class assigned at registration. Never recomputed on
/// heartbeat. Serializes as the bare integer `1|2|3` per the external
/// interface's register-response shape, not as the variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Tier {
    /// GPU-backed worker.
    Gpu = 1,
    /// General-purpose CPU worker.
    Cpu = 2,
    /// Storage-class worker (large disk, no GPU).
    Storage = 3,
}

impl Tier {
    /// Numeric tier value as used on the wire (`1`, `2`, or `3`).
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.as_u8()
    }
}

/// A tier value outside `1..=3` arrived on the wire.
#[derive(Debug, Error)]
#[error("invalid tier value: {0} (expected 1, 2, or 3)")]
pub struct InvalidTier(u8);

impl TryFrom<u8> for Tier {
    type Error = InvalidTier;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Gpu),
            2 => Ok(Self::Cpu),
            3 => Ok(Self::Storage),
            other => Err(InvalidTier(other)),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
            Self::Storage => write!(f, "storage"),
        }
    }
}

/// Declared hardware class of a worker, supplied at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerType {
    /// GPU-equipped host.
    Gpu,
    /// General CPU host.
    Cpu,
    /// Storage-class host.
    Storage,
    /// Resource-constrained edge host.
    Edge,
}

/// Hardware capability descriptor. Produced once by the capability detector
/// (C3) and never mutated after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityDescriptor {
    /// Logical CPU core count.
    pub cpu_cores: u32,
    /// Total RAM in gibibytes.
    pub ram_gb: f64,
    /// Total disk on the root filesystem, in gibibytes.
    pub storage_gb: f64,
    /// Whether a usable GPU was detected.
    pub has_gpu: bool,
    /// Single-device GPU memory in megabytes. Present iff `has_gpu`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gpu_memory_mb: Option<u64>,
    /// Human-readable GPU model string, e.g. `"RTX 4090"`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gpu_type: Option<String>,
    /// Declared worker type, independent of the derived tier.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub worker_type: Option<WorkerType>,
    /// Publicly reachable IP address, if probed successfully.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub public_ip: Option<String>,
}

impl CapabilityDescriptor {
    /// `has_gpu ⇔ gpu_memory_mb present`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.has_gpu == self.gpu_memory_mb.is_some()
    }

    /// Pure tier assignment per the tier assignment rule.
    ///
    /// - Tier 1: `has_gpu` AND `gpu_memory_mb >= 4000`.
    /// - Tier 3: declared `worker_type == storage`, OR (`ram_gb >= 16` AND
    ///   `!has_gpu` AND `storage_gb >= 100`).
    /// - Tier 2: everything else.
    #[must_use]
    pub fn assign_tier(&self) -> Tier {
        if self.has_gpu && self.gpu_memory_mb.unwrap_or(0) >= 4000 {
            return Tier::Gpu;
        }
        let declared_storage = matches!(self.worker_type, Some(WorkerType::Storage));
        if declared_storage || (self.ram_gb >= 16.0 && !self.has_gpu && self.storage_gb >= 100.0) {
            return Tier::Storage;
        }
        Tier::Cpu
    }
}

/// Status of a worker as tracked by the registry's health state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Registered but not yet confirmed healthy by a heartbeat.
    Initializing,
    /// Heartbeats arriving within the expected window.
    Online,
    /// Missed more than `2x` the heartbeat interval.
    Degraded,
    /// Missed more than `4x` the heartbeat interval.
    Offline,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Online => write!(f, "online"),
            Self::Degraded => write!(f, "degraded"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Reachability information for forwarding requests to a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reachability {
    /// Public HTTPS URL provided by the tunnel manager, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tunnel_url: Option<String>,
    /// Private mesh IP, preferred over the tunnel when present.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vpn_ip: Option<String>,
    /// Best-effort public IP, informational only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub public_ip: Option<String>,
}

/// Authoritative worker record as held by the coordinator-side registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Stable identity, immutable after creation.
    pub worker_id: WorkerId,
    /// Capability descriptor supplied at registration.
    pub capabilities: CapabilityDescriptor,
    /// Reachability as declared/updated by the worker.
    pub reachability: Reachability,
    /// Declared service-type tags this worker offers.
    pub services: HashSet<ServiceType>,
    /// Tier assigned at registration; never changes on heartbeat.
    pub tier: Tier,
    /// Unix timestamp (seconds) of the most recently ingested heartbeat.
    pub last_seen: i64,
    /// Current load in `[0.0, 1.0]`.
    pub load: f64,
    /// Available memory in gibibytes, as reported by the last heartbeat.
    pub available_memory_gb: f64,
    /// Current health status.
    pub status: WorkerStatus,
    /// Heartbeat interval, in seconds, assigned at registration.
    pub heartbeat_interval_s: u64,
    /// Consecutive heartbeat failures observed by the worker agent side;
    /// mirrored here for observability only, not used by the health monitor.
    #[serde(default)]
    pub consecutive_heartbeat_failures: u32,
}

impl WorkerRecord {
    /// A worker is eligible to serve requests iff it is `Online`.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self.status, WorkerStatus::Online)
    }

    /// A compact snapshot suitable for DHT publication and router selection.
    #[must_use]
    pub fn to_snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            worker_id: self.worker_id.clone(),
            tunnel_url: self.reachability.tunnel_url.clone(),
            vpn_ip: self.reachability.vpn_ip.clone(),
            services: self.services.iter().cloned().collect(),
            load: self.load,
            last_seen: self.last_seen,
            capabilities: SnapshotCapabilities {
                has_gpu: self.capabilities.has_gpu,
                gpu_memory_mb: self.capabilities.gpu_memory_mb,
            },
        }
    }
}

/// The `capabilities` object nested on a [`WorkerSnapshot`], matching the
/// normative DHT worker-record shape (§6) exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotCapabilities {
    /// Whether the worker has a usable GPU.
    pub has_gpu: bool,
    /// Single-device GPU memory in megabytes. Present iff `has_gpu`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gpu_memory_mb: Option<u64>,
}

/// Normative DHT worker-record shape (§6), also used as the router's
/// selection candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSnapshot {
    /// Stable worker identity.
    pub worker_id: WorkerId,
    /// Tunnel URL, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tunnel_url: Option<String>,
    /// VPN IP, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vpn_ip: Option<String>,
    /// Declared services.
    pub services: Vec<ServiceType>,
    /// Current load, `[0.0, 1.0]`.
    pub load: f64,
    /// Publisher-stamped freshness timestamp (unix seconds).
    pub last_seen: i64,
    /// Nested capability summary, `{has_gpu, gpu_memory_mb?}` on the wire.
    #[serde(default)]
    pub capabilities: SnapshotCapabilities,
}

/// Current unix timestamp in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
