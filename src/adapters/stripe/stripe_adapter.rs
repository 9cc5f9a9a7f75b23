//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port over the Stripe REST API using
//! form-encoded requests and HTTP basic auth with the secret key.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key).with_timeout(Duration::from_secs(10));
//! let adapter = StripePaymentAdapter::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::domain::billing::SubscriptionStatus;
use crate::domain::foundation::{CustomerId, SubscriptionId};
use crate::ports::{
    CreateCustomerRequest, CreateSubscriptionRequest, CreatedSubscription, Customer,
    PaymentError, PaymentErrorCode, PaymentProvider, PortalSession,
};

use super::api_types::{
    StripeCustomer, StripeErrorEnvelope, StripePortalSession, StripeSubscription,
};

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Per-request timeout covering connect, send and body read.
    request_timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_secret(SecretString::new(api_key.into()))
    }

    pub fn from_secret(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Stripe payment provider adapter.
#[derive(Debug)]
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                PaymentError::new(
                    PaymentErrorCode::ProviderError,
                    format!("Failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// POSTs a form and decodes the success body, mapping every failure to a
    /// `PaymentError`.
    async fn post_form<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        params: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, PaymentError> {
        let mut request = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params);

        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| transport_error(operation, e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = error_from_response(status, &body);
            tracing::error!(
                operation,
                status = status.as_u16(),
                code = %err.code,
                provider_code = ?err.provider_code,
                "Stripe request failed"
            );
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                return transport_error(operation, e);
            }
            PaymentError::new(
                PaymentErrorCode::ProviderError,
                format!("Failed to parse Stripe response: {}", e),
            )
        })
    }
}

fn transport_error(operation: &'static str, err: reqwest::Error) -> PaymentError {
    tracing::warn!(operation, error = %err, "Stripe request did not complete");
    if err.is_timeout() {
        PaymentError::timeout(format!("Stripe {} timed out", operation))
    } else {
        PaymentError::network(err.to_string())
    }
}

/// Maps a non-success Stripe response to a `PaymentError`.
fn error_from_response(status: StatusCode, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<StripeErrorEnvelope>(body).ok().map(|e| e.error);
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| format!("Stripe API error ({})", status.as_u16()));

    let code = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PaymentErrorCode::AuthenticationError,
        StatusCode::NOT_FOUND => PaymentErrorCode::NotFound,
        StatusCode::TOO_MANY_REQUESTS => PaymentErrorCode::RateLimitExceeded,
        StatusCode::BAD_REQUEST | StatusCode::PAYMENT_REQUIRED => PaymentErrorCode::InvalidRequest,
        _ => PaymentErrorCode::ProviderError,
    };

    let mut err = PaymentError::new(code, message);
    if status.is_server_error() {
        err.retryable = true;
    }
    match parsed.and_then(|e| e.code.or(Some(e.error_type))) {
        Some(provider_code) => err.with_provider_code(provider_code),
        None => err,
    }
}

fn customer_id(raw: String) -> Result<CustomerId, PaymentError> {
    CustomerId::new(raw).map_err(|e| {
        PaymentError::new(
            PaymentErrorCode::ProviderError,
            format!("Stripe returned an invalid customer id: {}", e),
        )
    })
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        let mut params = vec![("metadata[account_id]", request.account_id.to_string())];
        if let Some(email) = &request.email {
            params.push(("email", email.clone()));
        }

        let customer: StripeCustomer = self
            .post_form(
                "create_customer",
                "/v1/customers",
                &params,
                Some(&request.idempotency_key),
            )
            .await?;

        tracing::info!(
            account_id = %request.account_id,
            customer_id = %customer.id,
            "Stripe customer created"
        );

        Ok(Customer {
            id: customer_id(customer.id)?,
            email: customer.email.or(request.email),
        })
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<CreatedSubscription, PaymentError> {
        let params = vec![
            ("customer", request.customer_id.to_string()),
            ("items[0][price]", request.plan_id.to_string()),
            ("payment_behavior", "default_incomplete".to_string()),
            ("expand[]", "latest_invoice.payment_intent".to_string()),
        ];

        let subscription: StripeSubscription = self
            .post_form(
                "create_subscription",
                "/v1/subscriptions",
                &params,
                request.idempotency_key.as_deref(),
            )
            .await?;

        let client_secret = subscription.client_secret().map(str::to_string);
        let id = SubscriptionId::new(subscription.id).map_err(|e| {
            PaymentError::new(
                PaymentErrorCode::ProviderError,
                format!("Stripe returned an invalid subscription id: {}", e),
            )
        })?;

        Ok(CreatedSubscription {
            id,
            status: SubscriptionStatus::parse(&subscription.status),
            client_secret,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        let params = vec![
            ("customer", customer_id.to_string()),
            ("return_url", return_url.to_string()),
        ];

        let portal: StripePortalSession = self
            .post_form(
                "create_portal_session",
                "/v1/billing_portal/sessions",
                &params,
                None,
            )
            .await?;

        Ok(PortalSession {
            id: portal.id,
            url: portal.url,
        })
    }
}
