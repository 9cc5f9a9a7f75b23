//! Account record and the field updates the reconciler writes into it.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    AccountId, CustomerId, EventId, PlanId, SubscriptionId, Timestamp,
};

use super::SubscriptionStatus;

/// Per-user billing record.
///
/// Created at signup with status `none`. `processor_customer_id` is linked
/// once by provisioning. Subscription fields change only through
/// [`AccountRecord::apply`], driven by verified Stripe events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: AccountId,
    pub email: Option<String>,
    pub processor_customer_id: Option<CustomerId>,
    pub subscription_id: Option<SubscriptionId>,
    pub subscription_status: SubscriptionStatus,
    pub plan_id: Option<PlanId>,
    pub period_end: Option<Timestamp>,
    pub last_applied_event_id: Option<EventId>,
    pub last_applied_event_time: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AccountRecord {
    /// A freshly created, unlinked account with no subscription.
    pub fn new(account_id: AccountId, email: Option<String>, now: Timestamp) -> Self {
        Self {
            account_id,
            email,
            processor_customer_id: None,
            subscription_id: None,
            subscription_status: SubscriptionStatus::None,
            plan_id: None,
            period_end: None,
            last_applied_event_id: None,
            last_applied_event_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.processor_customer_id.is_some()
    }

    /// Writes a projected update into the record.
    ///
    /// Sets or clears all subscription fields together and advances the
    /// ordering cursor to the event that produced the update.
    pub fn apply(&mut self, update: &FieldUpdate, now: Timestamp) {
        match &update.fields {
            SubscriptionFields::Set {
                subscription_id,
                status,
                plan_id,
                period_end,
            } => {
                self.subscription_id = Some(subscription_id.clone());
                self.subscription_status = status.clone();
                self.plan_id = plan_id.clone();
                self.period_end = *period_end;
            }
            SubscriptionFields::Cleared => {
                self.subscription_id = None;
                self.subscription_status = SubscriptionStatus::Canceled;
                self.plan_id = None;
                self.period_end = None;
            }
        }
        self.last_applied_event_id = Some(update.event_id.clone());
        self.last_applied_event_time = Some(update.event_time);
        self.updated_at = now;
    }
}

/// New subscription state for one account, derived from one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub fields: SubscriptionFields,
    pub event_id: EventId,
    pub event_time: Timestamp,
}

/// The subscription half of a [`FieldUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionFields {
    /// Subscription exists; overwrite all four fields.
    Set {
        subscription_id: SubscriptionId,
        status: SubscriptionStatus,
        plan_id: Option<PlanId>,
        period_end: Option<Timestamp>,
    },
    /// Subscription ended; clear the fields and mark `canceled`.
    Cleared,
}
