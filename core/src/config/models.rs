// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Configuration data structures for the worker coordination fabric.
//!
//! Defines the complete schema for both binaries: `[coordinator]` (bind
//! address, heartbeat defaults, health-monitor interval, auth token,
//! readiness quorum) and `[worker]` (coordinator URL, service port,
//! tunnel usage, declared services).

use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Root configuration structure for the fabric.
///
/// Configuration sources are merged in this precedence (highest to
/// lowest): CLI arguments, environment variables (`COORD_FABRIC_`
/// prefix), config file (`~/.config/coord-fabric/config.toml`), defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Coordinator-side settings.
    pub coordinator: CoordinatorSettings,
    /// Worker-side settings.
    pub worker: WorkerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorSettings::default(),
            worker: WorkerSettings::default(),
        }
    }
}

/// Coordinator process settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Address the HTTP API binds to.
    pub bind_address: String,
    /// Default heartbeat interval handed to newly registered workers, in
    /// seconds.
    #[validate(minimum = 1)]
    #[validate(maximum = 3600)]
    pub heartbeat_interval_s: u64,
    /// Health-monitor sweep interval, in seconds.
    #[validate(minimum = 1)]
    #[validate(maximum = 3600)]
    pub health_check_interval_s: u64,
    /// Bearer token required on `/api/worker/register` and
    /// `/api/worker/heartbeat`. `None` disables the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Service types that must each have at least one online worker
    /// before the readiness callback fires.
    pub required_services: Vec<String>,
    /// Port the coordinator's own DHT seed node listens on.
    pub dht_port: u16,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            heartbeat_interval_s: 30,
            health_check_interval_s: 15,
            auth_token: None,
            required_services: Vec::new(),
            dht_port: 7946,
        }
    }
}

/// Worker agent settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct WorkerSettings {
    /// Base URL of the coordinator's HTTP API.
    pub coordinator_url: String,
    /// Service types this worker declares at registration.
    pub declared_services: Vec<String>,
    /// Port the worker's local service/router HTTP server listens on.
    pub service_port: u16,
    /// Whether to establish a `cloudflared` reverse tunnel at startup.
    pub use_tunnel: bool,
    /// Externally supplied tunnel URL, bypassing `cloudflared` entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_tunnel_url: Option<String>,
    /// Port the worker's own DHT node listens on.
    pub dht_port: u16,
    /// Bearer token sent with register/heartbeat requests, matching the
    /// coordinator's configured `auth_token`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            coordinator_url: "http://localhost:8080".to_string(),
            declared_services: Vec::new(),
            service_port: 8000,
            use_tunnel: false,
            external_tunnel_url: None,
            dht_port: 7947,
            auth_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_bind_address_is_all_interfaces() {
        assert_eq!(Config::default().coordinator.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn out_of_range_heartbeat_interval_fails_validation() {
        let mut config = Config::default();
        config.coordinator.heartbeat_interval_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).expect("serializes");
        let deserialized: Config = toml::from_str(&toml_str).expect("deserializes");
        assert_eq!(config, deserialized);
    }
}
