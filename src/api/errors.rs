//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.

use crate::errors::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code (NOT_FOUND, SEED_NOT_YET_REVEALED, ...)
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    /// Lifecycle conflict with a specific code
    Conflict { code: &'static str, message: String },
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn conflict(request_id: String, code: &'static str, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Conflict { code, message },
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    pub fn service_unavailable(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::ServiceUnavailable(message),
            request_id,
        }
    }

    /// Map an engine error onto an HTTP error. Internal details are logged,
    /// not returned.
    pub fn from_engine(request_id: String, err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::InvalidParameters(_) => Self::bad_request(request_id, message),
            EngineError::SeedNotFound(_) | EngineError::RoundNotFound(_) => {
                Self::not_found(request_id, message)
            }
            EngineError::SeedAlreadyInUse { .. } => {
                Self::conflict(request_id, "SEED_ALREADY_IN_USE", message)
            }
            EngineError::SeedRetired { .. } => Self::conflict(request_id, "SEED_RETIRED", message),
            EngineError::SeedStillActive { .. } => {
                Self::conflict(request_id, "SEED_STILL_ACTIVE", message)
            }
            EngineError::UnsettledRounds { .. } => {
                Self::conflict(request_id, "UNSETTLED_ROUNDS", message)
            }
            EngineError::SeedNotYetRevealed { .. } => {
                Self::conflict(request_id, "SEED_NOT_YET_REVEALED", message)
            }
            EngineError::RoundNotSettled(_) => {
                Self::conflict(request_id, "ROUND_NOT_SETTLED", message)
            }
            EngineError::InvalidTransition { .. } => {
                Self::conflict(request_id, "INVALID_TRANSITION", message)
            }
            EngineError::EntropyFailure(_) => {
                tracing::error!(request_id = %request_id, error = %message, "Round acceptance halted");
                Self::service_unavailable(
                    request_id,
                    "Round acceptance is halted".to_string(),
                )
            }
            ref other => {
                let severity = other.severity();
                tracing::error!(request_id = %request_id, ?severity, error = %message, "Request failed");
                Self::internal_error(request_id, "Internal server error".to_string())
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Conflict { code, message } => {
                write!(f, "[{}] Conflict ({}): {}", self.request_id, code, message)
            }
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
            ApiErrorKind::ServiceUnavailable(msg) => {
                write!(f, "[{}] Service Unavailable: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiErrorKind::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiErrorKind::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
