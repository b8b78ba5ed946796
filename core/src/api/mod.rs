// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Coordinator-facing HTTP API: a small axum router plus the error
//! taxonomy it speaks over the wire.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use coord_fabric_core::api::{router, AppState};
//! use coord_fabric_core::distributed::registry::WorkerRegistry;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let state = Arc::new(AppState {
//!         registry: Arc::new(WorkerRegistry::new()),
//!         dht: None,
//!         auth_token: None,
//!     });
//!     let app = router(state);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod rest;

pub use error::{ApiError, ApiResult};
pub use rest::{router, AppState};
