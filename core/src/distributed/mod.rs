// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Distributed Worker Coordination Fabric
//!
//! A hybrid coordinator/mesh architecture: workers self-register with a
//! coordinator over HTTP, publish their reachability into a Kademlia-style
//! DHT overlay, and the coordinator's request router dispatches service
//! calls to whichever worker is least loaded, preferring a private VPN
//! mesh over public tunnel URLs.
//!
//! ## Components
//!
//! - [`types`]: shared identities, the capability descriptor and its tier
//!   assignment rule, and the fabric's internal error taxonomy.
//! - [`registry`]: coordinator-side worker table and health state machine.
//! - [`health`]: supervised background sweep that ages workers through
//!   `online -> degraded -> offline -> evicted`.
//! - [`protocol`]: wire DTOs for the coordinator HTTP API.
//! - [`capability`]: synchronous hardware capability detection.
//! - [`tunnel`]: `cloudflared` reverse-tunnel process management.
//! - [`dht`]: the Kademlia-style overlay workers publish themselves into.
//! - [`router`]: local-first, cache-assisted request dispatch.
//! - [`readiness`]: one-shot side effect on first quorum satisfaction.
//! - [`worker_agent`]: the worker-side startup sequence and heartbeat loop.
//! - [`worker_api`]: the worker-local `/service/{type}` and `/health`
//!   surface served alongside the heartbeat loop.
//! - [`coordinator`]: ties the coordinator-side pieces together.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use coord_fabric_core::distributed::coordinator::{Coordinator, CoordinatorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let coordinator = Coordinator::new(CoordinatorConfig {
//!         dht_host: "0.0.0.0".to_string(),
//!         dht_port: 7946,
//!         required_services: vec!["ocr".to_string()],
//!         auth_token: None,
//!     });
//!     coordinator.spawn_background_tasks();
//!
//!     let app = coord_fabric_core::api::router(coordinator.app_state());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod capability;
pub mod coordinator;
pub mod dht;
pub mod health;
pub mod protocol;
pub mod readiness;
pub mod registry;
pub mod router;
pub mod tunnel;
pub mod types;
pub mod worker_agent;
pub mod worker_api;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use registry::WorkerRegistry;
pub use router::{PeerSource, RequestRouter};
pub use types::{
    CapabilityDescriptor, FabricError, Reachability, Tier, WorkerId, WorkerRecord,
    WorkerSnapshot, WorkerStatus, WorkerType,
};
pub use worker_agent::{WorkerAgent, WorkerAgentConfig};

/// Crate-visible protocol version, bumped on breaking wire changes to any
/// DTO in [`protocol`].
pub const FABRIC_PROTOCOL_VERSION: &str = "1.0.0";
