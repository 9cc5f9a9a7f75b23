//! CreateSubscriptionHandler - starts a subscription for a linked account.

use std::sync::Arc;

use crate::domain::billing::{BillingError, SubscriptionStatus};
use crate::domain::foundation::{AccountId, AuthenticatedUser, PlanId, SubscriptionId};
use crate::ports::{AccountDirectory, CreateSubscriptionRequest, PaymentProvider};

use super::authorize;

/// Command to create a subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    /// Caller identity; `None` when the request carried no valid token.
    pub caller: Option<AuthenticatedUser>,
    pub account_id: AccountId,
    pub plan_id: PlanId,
    /// Client-supplied key forwarded to Stripe, so a retried request does
    /// not create a second subscription.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubscriptionResult {
    pub subscription_id: SubscriptionId,
    pub status: SubscriptionStatus,
    /// Client secret the front end uses to confirm the first payment.
    pub payment_handle: String,
}

/// Handler for creating subscriptions.
///
/// Does not write to the directory; the resulting `customer.subscription.created`
/// event does that through reconciliation.
pub struct CreateSubscriptionHandler {
    directory: Arc<dyn AccountDirectory>,
    payment_provider: Arc<dyn PaymentProvider>,
}

impl CreateSubscriptionHandler {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        payment_provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            directory,
            payment_provider,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, BillingError> {
        authorize(cmd.caller.as_ref(), &cmd.account_id)?;

        let record = self
            .directory
            .find_by_account_id(&cmd.account_id)
            .await?
            .ok_or_else(|| BillingError::AccountNotFound(cmd.account_id.clone()))?;

        let customer_id = record.processor_customer_id.ok_or_else(|| {
            BillingError::precondition("Account has no billing customer yet")
        })?;

        let created = self
            .payment_provider
            .create_subscription(CreateSubscriptionRequest {
                customer_id: customer_id.clone(),
                plan_id: cmd.plan_id.clone(),
                idempotency_key: cmd.idempotency_key,
            })
            .await?;

        let payment_handle = created.client_secret.ok_or_else(|| {
            tracing::error!(
                account_id = %cmd.account_id,
                subscription_id = %created.id,
                "Subscription created without a payment intent"
            );
            BillingError::internal("Subscription has no payment intent")
        })?;

        tracing::info!(
            account_id = %cmd.account_id,
            %customer_id,
            subscription_id = %created.id,
            plan_id = %cmd.plan_id,
            "Subscription created"
        );

        Ok(CreateSubscriptionResult {
            subscription_id: created.id,
            status: created.status,
            payment_handle,
        })
    }
}
