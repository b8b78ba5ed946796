// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! API error handling: maps the fabric's error taxonomy onto HTTP
//! statuses and a typed JSON error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::distributed::types::FabricError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// API error, one variant per taxonomy category in the error handling
/// design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiError {
    /// Payload failed validation (400).
    BadRequest(String),
    /// Bearer token missing or incorrect (401).
    Unauthorized(String),
    /// Referenced worker or service does not exist (404).
    NotFound(String),
    /// Router exhausted its outbound concurrency budget (429).
    Busy(String),
    /// Transient network or forwarding failure (502).
    UpstreamUnavailable(String),
    /// Tunnel not yet up or timed out establishing one (503).
    ServiceUnavailable(String),
    /// Anything else, including bugs (500).
    InternalError(String),
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Busy(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Busy(_) => "BUSY",
            Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::NotFound(m)
            | Self::Busy(m)
            | Self::UpstreamUnavailable(m)
            | Self::ServiceUnavailable(m)
            | Self::InternalError(m) => m,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.error_code().to_string(),
            message: self.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Maps the fabric's internal error taxonomy to the API's HTTP-facing
/// taxonomy; transient/retryable errors surface as 502/429 rather than 500
/// so callers can distinguish "try again" from "this is broken."
impl From<FabricError> for ApiError {
    fn from(err: FabricError) -> Self {
        match err {
            FabricError::Validation(msg) => Self::BadRequest(msg),
            FabricError::Unauthorized => Self::Unauthorized("invalid or missing bearer token".to_string()),
            FabricError::NotRegistered(id) => Self::NotFound(format!("worker not registered: {id}")),
            FabricError::ServiceNotFound(svc) => Self::NotFound(format!("no workers for service: {svc}")),
            FabricError::Busy => Self::Busy("outbound concurrency limit reached".to_string()),
            FabricError::TransientNetwork(msg) | FabricError::RequestForwardingError(msg) => {
                Self::UpstreamUnavailable(msg)
            }
            FabricError::TunnelUnavailable(msg) => Self::ServiceUnavailable(msg),
            FabricError::TunnelTimeout(d) => {
                Self::ServiceUnavailable(format!("tunnel did not come up within {d:?}"))
            }
            FabricError::CapabilityFatal(msg) | FabricError::RegistrationFatal(msg) => {
                Self::InternalError(msg)
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}
