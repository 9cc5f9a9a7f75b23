//! Strongly-typed identifier value objects.
//!
//! Every identifier in this service is an opaque string owned by some other
//! system (the identity provider or Stripe), so they all share one shape:
//! a non-empty, trimmed `String` newtype.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, rejecting empty or whitespace-only input.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                if id.trim().len() != id.len() {
                    return Err(ValidationError::invalid_format(
                        $field,
                        "must not have surrounding whitespace",
                    ));
                }
                Ok(Self(id))
            }

            /// Returns the inner string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Internal account identifier, issued by the identity provider.
    AccountId,
    "account_id"
);

string_id!(
    /// Stripe customer identifier (`cus_...`).
    CustomerId,
    "customer_id"
);

string_id!(
    /// Stripe subscription identifier (`sub_...`).
    SubscriptionId,
    "subscription_id"
);

string_id!(
    /// Stripe price identifier of the subscribed plan (`price_...`).
    PlanId,
    "plan_id"
);

string_id!(
    /// Stripe event identifier (`evt_...`).
    EventId,
    "event_id"
);
