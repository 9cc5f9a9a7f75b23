//! HTTP DTOs for billing endpoints.
//!
//! JSON request/response bodies for the webhook, internal and gateway routes.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{
    ApplyOutcome, CreateSubscriptionResult, HandleWebhookResult, OpenBillingPortalResult,
    ProvisionCustomerResult,
};
use crate::domain::billing::SubscriptionStatus;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of the account-creation trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionAccountRequest {
    pub account_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    /// Stripe price id of the plan.
    pub plan_id: String,
    /// Target account; defaults to the caller's own.
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenPortalRequest {
    pub return_url: String,
    /// Target account; defaults to the caller's own.
    #[serde(default)]
    pub account_id: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Acknowledgement returned to Stripe for a delivery that needs no retry.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&HandleWebhookResult> for WebhookAckResponse {
    fn from(result: &HandleWebhookResult) -> Self {
        let reason = match result.outcome {
            ApplyOutcome::Applied => None,
            ApplyOutcome::Ignored(reason) => serde_json::to_value(reason)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string)),
            ApplyOutcome::Failed(reason) => serde_json::to_value(reason)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string)),
        };
        Self {
            received: true,
            outcome: result.outcome.as_str(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionAccountResponse {
    pub account_id: String,
    pub processor_customer_id: String,
}

impl From<ProvisionCustomerResult> for ProvisionAccountResponse {
    fn from(result: ProvisionCustomerResult) -> Self {
        Self {
            account_id: result.account_id.into(),
            processor_customer_id: result.customer_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSubscriptionResponse {
    pub subscription_id: String,
    /// Client secret used to confirm the first payment.
    pub payment_handle: String,
    pub status: SubscriptionStatus,
}

impl From<CreateSubscriptionResult> for CreateSubscriptionResponse {
    fn from(result: CreateSubscriptionResult) -> Self {
        Self {
            subscription_id: result.subscription_id.into(),
            payment_handle: result.payment_handle,
            status: result.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

impl From<OpenBillingPortalResult> for PortalResponse {
    fn from(result: OpenBillingPortalResult) -> Self {
        Self { url: result.url }
    }
}

/// Standard error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
