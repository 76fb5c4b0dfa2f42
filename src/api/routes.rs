//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Round lifecycle
        .route("/rounds", post(open_round_handler))
        .route("/rounds/:round_number", get(round_handler))
        .route("/rounds/:round_number/settle", post(settle_round_handler))
        .route("/rounds/:round_number/verify", get(verify_round_handler))
        .route("/rounds/:round_number/recipe", get(recipe_handler))
        // Seed lifecycle
        .route("/seeds/active", get(active_seed_handler))
        .route("/seeds/rotate", post(rotate_seed_handler))
        .route("/seeds/:seed_id/reveal", post(reveal_seed_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/json", get(metrics_json_handler))
        .with_state(state)
}
