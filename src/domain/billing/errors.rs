//! Billing error taxonomy.

use thiserror::Error;

use crate::domain::foundation::{AccountId, CustomerId, ValidationError};

/// Why an inbound webhook was refused before any processing.
///
/// Always the sender's fault (or an attacker's); never retried by us.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Missing Stripe-Signature header")]
    MissingHeader,

    #[error("Malformed Stripe-Signature header: {0}")]
    MalformedHeader(String),

    #[error("Webhook timestamp is {age_secs}s old, outside the tolerance window")]
    TimestampTooOld { age_secs: i64 },

    #[error("Webhook timestamp is {ahead_secs}s in the future")]
    TimestampInFuture { ahead_secs: i64 },

    #[error("No signature matched the payload")]
    SignatureMismatch,

    #[error("Malformed event payload: {0}")]
    MalformedPayload(String),
}

/// Errors surfaced by billing commands and queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Account {account_id} is already linked to {existing}, refusing {requested}")]
    AlreadyLinked {
        account_id: AccountId,
        existing: CustomerId,
        requested: CustomerId,
    },

    #[error("Customer {0} is already linked to another account")]
    CustomerAlreadyClaimed(CustomerId),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Caller may not act on this account")]
    PermissionDenied,

    #[error("Temporarily unavailable: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Transient(_))
    }

    /// Data-integrity conditions are logged loudly and never auto-repaired.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            BillingError::AlreadyLinked { .. }
                | BillingError::CustomerAlreadyClaimed(_)
        )
    }

    /// Client-safe message; internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            BillingError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}
