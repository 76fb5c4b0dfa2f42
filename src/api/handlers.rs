//! Request Handlers
//!
//! Engine operations are synchronous and short, so handlers call them inline.

use super::{
    errors::ApiError,
    middleware::RequestId,
    models::*,
};
use crate::engine::{FairnessEngine, SeedCommitment, SeedDisclosure, SeedRotation};
use crate::games::GameParameters;
use crate::ledger::Round;
use crate::metrics::MetricsSnapshot;
use crate::seed_vault::SeedId;
use crate::verification::{Recipe, VerificationResult};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub engine: Arc<FairnessEngine>,
    pub version: String,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn path_value<T>(request_id: &RequestId, path: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    path.map(|Path(value)| value)
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), e.body_text()))
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let accepting = state.engine.is_accepting();
    let status = if accepting { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(HealthResponse {
            status: if accepting { "ok" } else { "halted" }.to_string(),
            accepting_rounds: accepting,
            version: state.version.clone(),
        }),
    )
}

/// POST /rounds
pub async fn open_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OpenRoundRequest>, JsonRejection>,
) -> ApiResult<OpenRoundResponse> {
    let Json(request) =
        payload.map_err(|e| ApiError::bad_request(request_id.0.clone(), e.body_text()))?;

    let params = GameParameters::from_json(request.game_type, request.game_parameters)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    let round = state
        .engine
        .place_bet(request.game_type, params, request.client_seed.as_deref())
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(OpenRoundResponse::from(&round)))
}

/// POST /rounds/:round_number/settle
pub async fn settle_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<SettleRoundResponse> {
    let round_number = path_value(&request_id, path)?;
    let round = state
        .engine
        .settle(round_number)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(SettleRoundResponse::from(&round)))
}

/// GET /rounds/:round_number
pub async fn round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<Round> {
    let round_number = path_value(&request_id, path)?;
    state
        .engine
        .round(round_number)
        .map(Json)
        .map_err(|e| ApiError::from_engine(request_id.0, e))
}

/// GET /rounds/:round_number/verify
pub async fn verify_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<VerificationResult> {
    let round_number = path_value(&request_id, path)?;
    state
        .engine
        .verify(round_number)
        .map(Json)
        .map_err(|e| ApiError::from_engine(request_id.0, e))
}

/// GET /rounds/:round_number/recipe
pub async fn recipe_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<Recipe> {
    let round_number = path_value(&request_id, path)?;
    state
        .engine
        .explain(round_number)
        .map(Json)
        .map_err(|e| ApiError::from_engine(request_id.0, e))
}

/// GET /seeds/active
pub async fn active_seed_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<SeedCommitment> {
    state
        .engine
        .active_seed()
        .map(Json)
        .map_err(|e| ApiError::from_engine(request_id.0, e))
}

/// POST /seeds/rotate
pub async fn rotate_seed_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<SeedRotation> {
    state
        .engine
        .rotate_seed()
        .map(Json)
        .map_err(|e| ApiError::from_engine(request_id.0, e))
}

/// POST /seeds/:seed_id/reveal
pub async fn reveal_seed_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    path: Result<Path<SeedId>, PathRejection>,
) -> ApiResult<SeedDisclosure> {
    let seed_id = path_value(&request_id, path)?;
    state
        .engine
        .reveal_seed(seed_id)
        .map(Json)
        .map_err(|e| ApiError::from_engine(request_id.0, e))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.engine.metrics().to_prometheus_format(),
    )
}

/// GET /metrics/json
pub async fn metrics_json_handler(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.engine.metrics().snapshot())
}
