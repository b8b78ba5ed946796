// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Coordinator HTTP API (C9): the external interface table as an axum
//! router over dependency-injected [`AppState`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::distributed::dht::DhtNode;
use crate::distributed::registry::{HeartbeatPayload, RegisterRequest, WorkerRegistry};
use crate::distributed::protocol::{
    DhtSeedDto, HealthResponseDto, HeartbeatRequestDto, ListWorkersResponseDto, OkResponse,
    RegisterRequestDto, RegisterResponseDto, SeedsResponseDto, WorkerCountsDto,
};

use super::error::{ApiError, ApiResult};

/// Shared state injected into every handler. Built once at coordinator
/// startup and passed in explicitly; no module-level statics.
pub struct AppState {
    pub registry: Arc<WorkerRegistry>,
    pub dht: Option<Arc<DhtNode>>,
    pub auth_token: Option<String>,
}

/// Build the coordinator's router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/worker/register", post(register))
        .route("/api/worker/heartbeat", post(heartbeat))
        .route("/api/worker/unregister/:worker_id", delete(unregister))
        .route("/api/admin/workers", get(list_workers))
        .route("/health", get(health))
        .route("/api/dht/seeds", get(seeds))
        .with_state(state)
}

/// Bearer-token guard, required on `/api/worker/register` and
/// `/api/worker/heartbeat` when `auth_token` is configured. With no
/// configured token the check is a no-op, matching an operator who has
/// not opted into authentication.
fn check_auth(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = &state.auth_token else {
        return Ok(());
    };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized(
            "invalid or missing bearer token".to_string(),
        ))
    }
}

async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequestDto>,
) -> ApiResult<Json<RegisterResponseDto>> {
    check_auth(&state, &headers)?;

    let reachability = body.reachability();
    let assignment = state.registry.register(RegisterRequest {
        capabilities: body.capabilities,
        reachability,
        services: body.services,
        worker_id: None,
    })?;

    Ok(Json(RegisterResponseDto {
        worker_id: assignment.worker_id,
        tier: assignment.tier,
        heartbeat_interval: assignment.heartbeat_interval_s,
        assigned_containers: if body.containers.is_empty() {
            None
        } else {
            Some(body.containers)
        },
    }))
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<HeartbeatRequestDto>,
) -> ApiResult<Json<OkResponse>> {
    check_auth(&state, &headers)?;

    state.registry.heartbeat(
        &body.worker_id,
        HeartbeatPayload {
            current_load: body.current_load,
            available_memory_gb: body.available_memory,
        },
    )?;
    Ok(Json(OkResponse::ok()))
}

async fn unregister(
    State(state): State<Arc<AppState>>,
    Path(worker_id): Path<String>,
) -> Json<OkResponse> {
    state.registry.unregister(&worker_id);
    Json(OkResponse::ok())
}

async fn list_workers(State(state): State<Arc<AppState>>) -> Json<ListWorkersResponseDto> {
    let workers = state
        .registry
        .list_workers()
        .iter()
        .map(|record| record.to_snapshot())
        .collect();
    Json(ListWorkersResponseDto { workers })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponseDto> {
    let counts = state.registry.worker_counts();
    let by_tier = counts
        .by_tier
        .into_iter()
        .map(|(tier, count)| (tier.to_string(), count))
        .collect::<HashMap<_, _>>();
    let status = if counts.total == 0 || counts.healthy > 0 {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponseDto {
        status: status.to_string(),
        workers: Some(WorkerCountsDto {
            total: counts.total,
            by_tier,
            healthy: counts.healthy,
        }),
        services: None,
    })
}

async fn seeds(State(state): State<Arc<AppState>>) -> Json<SeedsResponseDto> {
    let Some(dht) = &state.dht else {
        return Json(SeedsResponseDto {
            seeds: Vec::new(),
            ttl: crate::distributed::dht::DEFAULT_TTL_S,
        });
    };
    let contact = dht.contact();
    Json(SeedsResponseDto {
        seeds: vec![DhtSeedDto {
            node_id: contact.node_id.to_hex(),
            host: contact.host,
            dht_port: contact.port,
        }],
        ttl: crate::distributed::dht::DEFAULT_TTL_S,
    })
}
