//! Billing HTTP adapter.
//!
//! Exposes the webhook endpoint, the internal provisioning trigger and the
//! caller-facing subscription and portal actions.

pub mod dto;
mod handlers;
mod routes;

pub use dto::ErrorResponse;
pub use handlers::{BillingApiError, BillingAppState, IDEMPOTENCY_HEADER, SIGNATURE_HEADER};
pub use routes::{billing_router, gateway_routes, internal_routes, webhook_routes};
