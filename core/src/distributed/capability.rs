// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Capability detector (C3): a pure, synchronous probe of the local host
//! that produces a [`CapabilityDescriptor`]. GPU detection failure
//! degrades to `has_gpu: false` rather than propagating an error — the
//! descriptor must always be produceable.

use std::time::Duration;

use crate::distributed::types::{CapabilityDescriptor, WorkerType};

/// Echo services probed, in order, to learn this host's public IP. Each
/// probe gets a 5s timeout; the first success wins.
const PUBLIC_IP_ECHO_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

const PUBLIC_IP_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// GPU facts gathered by [`detect_gpu`]. Kept separate from
/// `CapabilityDescriptor` so the GPU probe can be unit tested without
/// constructing a full descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuInfo {
    pub has_gpu: bool,
    pub memory_mb: Option<u64>,
    pub gpu_type: Option<String>,
}

/// Detect CPU, RAM and disk, probe for a GPU, and attempt to learn this
/// host's public IP. Declared `worker_type` is left `None`; callers (the
/// worker agent, or an operator override) set it explicitly.
#[must_use]
pub fn detect_capabilities() -> CapabilityDescriptor {
    let cpu_cores = detect_cpu_cores();
    let ram_gb = detect_ram_gb();
    let storage_gb = detect_storage_gb();
    let gpu = detect_gpu();
    let public_ip = detect_public_ip();

    CapabilityDescriptor {
        cpu_cores,
        ram_gb,
        storage_gb,
        has_gpu: gpu.has_gpu,
        gpu_memory_mb: gpu.memory_mb,
        gpu_type: gpu.gpu_type,
        worker_type: None,
        public_ip,
    }
}

/// Same as [`detect_capabilities`] but with an explicit declared
/// [`WorkerType`], as used when an operator overrides auto-detection
/// (e.g. forcing `storage` on a large-disk host that also happens to
/// carry a GPU).
#[must_use]
pub fn detect_capabilities_with_type(worker_type: WorkerType) -> CapabilityDescriptor {
    CapabilityDescriptor {
        worker_type: Some(worker_type),
        ..detect_capabilities()
    }
}

fn detect_cpu_cores() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

fn detect_ram_gb() -> f64 {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0)
}

fn detect_storage_gb() -> f64 {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .iter()
        .find(|disk| disk.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().next())
        .map(|disk| disk.total_space() as f64 / (1024.0 * 1024.0 * 1024.0))
        .unwrap_or(0.0)
}

/// Query for an available GPU. On any failure (no query helper present,
/// query error, unparseable output) returns `has_gpu: false` per the
/// component's fallback contract — GPU absence is never fatal.
fn detect_gpu() -> GpuInfo {
    match query_nvidia_smi() {
        Some(info) => info,
        None => GpuInfo::default(),
    }
}

fn query_nvidia_smi() -> Option<GpuInfo> {
    let output = std::process::Command::new("nvidia-smi")
        .args([
            "--query-gpu=memory.total,name",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let text = String::from_utf8(output.stdout).ok()?;
    let first_line = text.lines().next()?;
    let mut fields = first_line.splitn(2, ',');
    let memory_mb: u64 = fields.next()?.trim().parse().ok()?;
    let gpu_type = fields.next().map(|s| s.trim().to_string());

    Some(GpuInfo {
        has_gpu: true,
        memory_mb: Some(memory_mb),
        gpu_type,
    })
}

/// Probe up to three well-known echo services with a 5s timeout each,
/// returning the first success. Returns `None` if all probes fail —
/// reachability degrades to whatever the tunnel/VPN layers can supply.
fn detect_public_ip() -> Option<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(PUBLIC_IP_PROBE_TIMEOUT)
        .build()
        .ok()?;

    for url in PUBLIC_IP_ECHO_SERVICES {
        if let Ok(response) = client.get(*url).send() {
            if let Ok(text) = response.text() {
                let ip = text.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }
    None
}
