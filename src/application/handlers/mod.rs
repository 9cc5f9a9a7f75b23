//! Command handlers, grouped by area.

pub mod billing;

pub use billing::{
    ApplyOutcome, CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
    FailureReason, HandleWebhookCommand, HandleWebhookHandler, HandleWebhookResult, IgnoreReason,
    OpenBillingPortalCommand, OpenBillingPortalHandler, OpenBillingPortalResult,
    ProvisionCustomerCommand, ProvisionCustomerHandler, ProvisionCustomerResult,
    ReconciliationApplier,
};
