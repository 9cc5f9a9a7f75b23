//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, caller identity and validation errors used by
//! the billing domain and every layer above it.

mod auth;
mod errors;
mod ids;
mod timestamp;

pub use auth::{AuthError, AuthenticatedUser};
pub use errors::ValidationError;
pub use ids::{AccountId, CustomerId, EventId, PlanId, SubscriptionId};
pub use timestamp::Timestamp;
