//! Stripe REST response shapes.
//!
//! Only the fields this service reads are declared; Stripe adds fields freely
//! and serde ignores the rest.

use serde::Deserialize;

/// Stripe Customer object.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    /// Unique customer identifier (cus_...).
    pub id: String,

    pub email: Option<String>,

    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

/// Stripe Subscription object as returned by `POST /v1/subscriptions` with
/// `expand[]=latest_invoice.payment_intent`.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    pub status: String,

    /// Expanded invoice, or its bare id when expansion was not applied.
    #[serde(default)]
    pub latest_invoice: Option<Expandable<StripeInvoice>>,
}

impl StripeSubscription {
    /// Client secret of the first invoice's payment intent, if expanded.
    pub fn client_secret(&self) -> Option<&str> {
        match self.latest_invoice.as_ref()? {
            Expandable::Object(invoice) => match invoice.payment_intent.as_ref()? {
                Expandable::Object(intent) => intent.client_secret.as_deref(),
                Expandable::Id(_) => None,
            },
            Expandable::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,

    #[serde(default)]
    pub payment_intent: Option<Expandable<StripePaymentIntent>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
}

/// Billing portal session.
#[derive(Debug, Clone, Deserialize)]
pub struct StripePortalSession {
    pub id: String,
    pub url: String,
}

/// A field Stripe returns either as an id or as the expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(T),
}

/// Error envelope: `{"error": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorEnvelope {
    pub error: StripeApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiError {
    /// `api_error`, `card_error`, `idempotency_error`, `invalid_request_error`, ...
    #[serde(rename = "type")]
    pub error_type: String,

    pub code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}
