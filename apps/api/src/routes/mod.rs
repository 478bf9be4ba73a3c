pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::proposals::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Related-topic proposals
        .route("/api/v1/proposals", get(handlers::handle_get_proposals))
        .route(
            "/api/v1/proposals/config",
            get(handlers::handle_get_config).patch(handlers::handle_update_config),
        )
        .route(
            "/api/v1/proposals/:proposal_id/dismiss",
            post(handlers::handle_dismiss),
        )
        .route(
            "/api/v1/proposals/:proposal_id/share",
            post(handlers::handle_share),
        )
        .route(
            "/api/v1/proposals/:proposal_id/view",
            post(handlers::handle_view),
        )
        .with_state(state)
}
