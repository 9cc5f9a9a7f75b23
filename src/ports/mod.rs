//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `AccountDirectory` - Durable account records with conditional writes
//! - `PaymentProvider` - Stripe customer, subscription and portal calls
//! - `SessionValidator` - Caller identity from bearer tokens

mod account_directory;
mod payment_provider;
mod session_validator;

pub use account_directory::{AccountDirectory, DirectoryError, WriteOutcome};
pub use payment_provider::{
    CreateCustomerRequest, CreateSubscriptionRequest, CreatedSubscription, Customer,
    PaymentError, PaymentErrorCode, PaymentProvider, PortalSession,
};
pub use session_validator::SessionValidator;
