//! Billing domain module.
//!
//! Everything that decides what an account's subscription state should be,
//! independent of storage and transport.
//!
//! # Module Structure
//!
//! - `account` - Account record and field updates
//! - `event` - Verified processor events
//! - `signature` - Webhook signature verification
//! - `projector` - Event to field-update projection
//! - `status` - Subscription status
//! - `errors` - Billing error taxonomy

mod account;
mod errors;
mod event;
mod projector;
mod signature;
mod status;

pub use account::{AccountRecord, FieldUpdate, SubscriptionFields};
pub use errors::{BillingError, VerificationError};
pub use event::{
    EventKind, ProcessorEvent, SubscriptionSnapshot, SUBSCRIPTION_CREATED, SUBSCRIPTION_DELETED,
    SUBSCRIPTION_UPDATED,
};
pub use projector::{project, Projection, RejectReason};
pub use signature::{SignatureHeader, WebhookVerifier, DEFAULT_TOLERANCE_SECS};
pub use status::SubscriptionStatus;
