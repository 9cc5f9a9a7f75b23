//! HTTP adapters - REST API implementations.
//!
//! `app_router` assembles the full service: billing routes, `/health`, and
//! the request-id, trace and timeout layers.

pub mod billing;
pub mod middleware;

use std::time::Duration;

use axum::{routing::get, Json, Router};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub use billing::{billing_router, BillingApiError, BillingAppState, ErrorResponse};
pub use middleware::{AuthState, InternalToken};

/// GET /health - liveness.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Builds the service router.
pub fn app_router(
    state: BillingAppState,
    auth: AuthState,
    internal_token: InternalToken,
    request_timeout: Duration,
) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(billing_router(auth, internal_token))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
