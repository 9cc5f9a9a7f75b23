//! Payment provider port for processor-side customer and subscription calls.
//!
//! Only the synchronous calls this service makes are modelled here. Inbound
//! webhooks are authenticated in the domain (`WebhookVerifier`) because they
//! need nothing from the provider but the shared secret.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::billing::{BillingError, SubscriptionStatus};
use crate::domain::foundation::{AccountId, CustomerId, PlanId, SubscriptionId};

/// Port for payment provider integrations.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a customer tagged with the owning account id.
    ///
    /// The request's idempotency key makes retries return the original
    /// customer instead of creating another.
    async fn create_customer(&self, request: CreateCustomerRequest)
        -> Result<Customer, PaymentError>;

    /// Create a subscription in `default_incomplete` mode, returning the
    /// client secret the front end needs to confirm the first payment.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<CreatedSubscription, PaymentError>;

    /// Create a single-use billing portal session.
    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError>;
}

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Stored as `metadata[account_id]` on the customer.
    pub account_id: AccountId,
    pub email: Option<String>,
    pub idempotency_key: String,
}

/// Customer in the payment system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: Option<String>,
}

/// Request to create a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub idempotency_key: Option<String>,
}

/// Subscription as returned by the create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSubscription {
    pub id: SubscriptionId,
    pub status: SubscriptionStatus,
    /// Client secret of `latest_invoice.payment_intent`, if one was created.
    pub client_secret: Option<String>,
}

/// Portal session for subscription management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,
    /// Provider's own error code, when it sent one.
    pub provider_code: Option<String>,
    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::Timeout, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidRequest, message)
    }
}

impl From<PaymentError> for BillingError {
    fn from(err: PaymentError) -> Self {
        match err.code {
            _ if err.retryable => BillingError::Transient(err.to_string()),
            PaymentErrorCode::InvalidRequest | PaymentErrorCode::NotFound => {
                BillingError::PreconditionFailed(err.message)
            }
            _ => BillingError::Internal(err.to_string()),
        }
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    NetworkError,
    Timeout,
    AuthenticationError,
    /// Rejected parameters, e.g. an unknown price id.
    InvalidRequest,
    NotFound,
    RateLimitExceeded,
    ProviderError,
    Unknown,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::Timeout
                | PaymentErrorCode::RateLimitExceeded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::Timeout => "timeout",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
