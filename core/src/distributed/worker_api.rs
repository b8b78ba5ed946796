// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Worker-side local HTTP (C6 entry point): the minimal `/service/{type}`
//! and `/health` surface a worker exposes so the coordinator's router (or a
//! peer worker forwarding to it) has somewhere to land a request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::error::{ApiError, ApiResult};
use crate::distributed::protocol::HealthResponseDto;
use crate::distributed::router::{RequestRouter, RouteOutcome};
use crate::distributed::types::FabricError;

/// Dispatches a request for a locally-hosted service type to whatever
/// actually runs it (an OCR pipeline, an LLM server, ...). Those handlers
/// are external collaborators of this fabric, not part of it; a worker
/// that declares a service without registering a handler answers `503`.
#[async_trait]
pub trait LocalServiceHandler: Send + Sync {
    /// Run `service_type`'s handler against `body`, returning its JSON
    /// response.
    async fn handle(
        &self,
        service_type: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, FabricError>;
}

/// Shared state for the worker-local router.
pub struct WorkerApiState {
    /// Decides local-vs-forward and performs outbound forwarding.
    pub router: Arc<RequestRouter>,
    /// Executes requests for service types this worker hosts in-process.
    pub local_handler: Option<Arc<dyn LocalServiceHandler>>,
}

/// Build the worker-local router served on `service_port`.
pub fn router(state: Arc<WorkerApiState>) -> Router {
    Router::new()
        .route("/service/:service_type", post(dispatch_service))
        .route("/health", get(health))
        .with_state(state)
}

async fn dispatch_service(
    State(state): State<Arc<WorkerApiState>>,
    Path(service_type): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    match state.router.route(&service_type, body.clone()).await? {
        RouteOutcome::Forwarded(response) => Ok(Json(response)),
        RouteOutcome::Local => {
            let Some(handler) = &state.local_handler else {
                return Err(ApiError::ServiceUnavailable(format!(
                    "no local handler registered for service: {service_type}"
                )));
            };
            let response = handler.handle(&service_type, body).await?;
            Ok(Json(response))
        }
    }
}

async fn health(State(state): State<Arc<WorkerApiState>>) -> Json<HealthResponseDto> {
    let services = state
        .router
        .local_services()
        .iter()
        .map(|svc| (svc.clone(), "healthy".to_string()))
        .collect::<HashMap<_, _>>();
    Json(HealthResponseDto {
        status: "ok".to_string(),
        workers: None,
        services: Some(services),
    })
}
