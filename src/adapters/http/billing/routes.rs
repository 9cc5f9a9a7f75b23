//! Axum router configuration for billing endpoints.

use axum::{middleware, routing::post, Router};

use crate::adapters::http::middleware::{
    auth_middleware, internal_token_middleware, AuthState, InternalToken,
};

use super::handlers::{
    create_subscription, handle_stripe_webhook, open_billing_portal, provision_account,
    BillingAppState,
};

/// Caller-facing routes. Require `Authorization: Bearer <jwt>`.
///
/// - `POST /subscriptions` - Start a subscription
/// - `POST /portal` - Open the Stripe billing portal
pub fn gateway_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/subscriptions", post(create_subscription))
        .route("/portal", post(open_billing_portal))
}

/// Stripe webhook routes. No user auth; the payload signature is verified.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Service-to-service routes. Require the internal shared token.
pub fn internal_routes() -> Router<BillingAppState> {
    Router::new().route("/accounts", post(provision_account))
}

/// Complete billing router with each group behind its own guard.
///
/// Mounts `/api/billing`, `/webhooks` and `/internal`.
pub fn billing_router(auth: AuthState, internal_token: InternalToken) -> Router<BillingAppState> {
    Router::new()
        .nest(
            "/api/billing",
            gateway_routes().route_layer(middleware::from_fn_with_state(auth, auth_middleware)),
        )
        .nest("/webhooks", webhook_routes())
        .nest(
            "/internal",
            internal_routes().route_layer(middleware::from_fn_with_state(
                internal_token,
                internal_token_middleware,
            )),
        )
}
