use crate::{
    handlers::{diagnostics, health_check, room_ticket},
    orchestrator::ApiState,
    routes::auth_middleware::auth_middleware,
};
use axum::{middleware, routing::{get, post}, Router};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(state: Arc<ApiState>) -> Router {
    Router::<Arc<ApiState>>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/documents/:doc_id/room", post(room_ticket))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)) // Applies to all routes added above
        .route("/health", get(health_check))
        .with_state(state)
}
