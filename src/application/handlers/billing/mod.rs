//! Billing handlers.
//!
//! ## Commands
//! - Reconciling verified Stripe events into account records
//! - Handling raw webhook deliveries (verify, then reconcile)
//! - Provisioning a Stripe customer for a new account
//! - Creating subscriptions and opening the billing portal for the caller

mod create_subscription;
mod handle_webhook;
mod open_billing_portal;
mod provision_customer;
mod reconcile_event;

pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
};
pub use handle_webhook::{HandleWebhookCommand, HandleWebhookHandler, HandleWebhookResult};
pub use open_billing_portal::{
    OpenBillingPortalCommand, OpenBillingPortalHandler, OpenBillingPortalResult,
};
pub use provision_customer::{
    provisioning_key, ProvisionCustomerCommand, ProvisionCustomerHandler, ProvisionCustomerResult,
};
pub use reconcile_event::{ApplyOutcome, FailureReason, IgnoreReason, ReconciliationApplier};

use crate::domain::billing::BillingError;
use crate::domain::foundation::{AccountId, AuthenticatedUser};

/// Caller must be authenticated and must own `account_id`.
fn authorize(
    caller: Option<&AuthenticatedUser>,
    account_id: &AccountId,
) -> Result<(), BillingError> {
    match caller {
        None => Err(BillingError::Unauthenticated),
        Some(user) if !user.owns(account_id) => {
            tracing::warn!(caller = %user.id, %account_id, "Caller does not own account");
            Err(BillingError::PermissionDenied)
        }
        Some(_) => Ok(()),
    }
}
