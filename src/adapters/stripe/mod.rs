//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port for the three synchronous calls this
//! service makes: customer creation, subscription creation and billing portal
//! sessions. Webhook authentication lives in the domain (`WebhookVerifier`).
//!
//! The secret key is held as a `secrecy::SecretString` and never logged.

mod api_types;
mod mock_payment_provider;
mod stripe_adapter;

pub use mock_payment_provider::{MethodCall, MockPaymentProvider};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
